use std::time::Duration;
use thiserror::Error;

/// Reason codes for audio decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeReason {
    /// Input is not 16-bit little-endian PCM (or a PCM16 WAV stream).
    UnsupportedEncoding,
    /// A header or sample was cut off mid-way.
    TruncatedHeader,
    /// Header sample rate disagrees with the negotiated session rate.
    InvalidSampleRate,
}

impl std::fmt::Display for DecodeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecodeReason::UnsupportedEncoding => "unsupported-encoding",
            DecodeReason::TruncatedHeader => "truncated-header",
            DecodeReason::InvalidSampleRate => "invalid-sample-rate",
        };
        f.write_str(s)
    }
}

/// Malformed or unsupported input audio. Fatal to the session, never retried.
#[derive(Error, Debug, Clone)]
#[error("audio decode failed ({reason}): {detail}")]
pub struct DecodeError {
    pub reason: DecodeReason,
    pub detail: String,
}

impl DecodeError {
    pub fn new(reason: DecodeReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Transport-level failure talking to the recognition backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to connect to backend: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("backend rejected the stream: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("backend sent an unreadable event: {0}")]
    BadEvent(String),

    #[error("invalid backend credentials: {0}")]
    Credentials(String),
}

impl BackendError {
    /// Whether a fresh connection attempt could plausibly succeed.
    ///
    /// Definitive rejections (credentials, invalid arguments) must fail the
    /// session immediately instead of being retried.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Connect(_) => true,
            BackendError::Rpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Aborted
            ),
            BackendError::BadEvent(_) | BackendError::Credentials(_) => false,
        }
    }
}

/// Session-level failures, as surfaced to the gateway.
///
/// This is the single externally visible error surface: the session manager
/// translates decoder, backend, and aggregator failures into one of these.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("backend session broken mid-stream: {0}")]
    SessionBroken(#[source] BackendError),

    #[error("backend sent inconsistent events: {0}")]
    ProtocolViolation(String),

    #[error("backend did not finalize within {timeout:?}")]
    FinalizeTimeout { timeout: Duration },

    #[error("client outpaced the backend, frame buffer full ({capacity} frames)")]
    Overrun { capacity: usize },

    #[error("session is {state} and no longer accepts audio")]
    NotStreaming { state: &'static str },
}

impl SessionError {
    /// Stable machine-readable code used in client-facing error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Decode(_) => "decode_error",
            SessionError::SessionBroken(_) => "session_broken",
            SessionError::ProtocolViolation(_) => "protocol_violation",
            SessionError::FinalizeTimeout { .. } => "finalize_timeout",
            SessionError::Overrun { .. } => "overrun",
            SessionError::NotStreaming { .. } => "not_streaming",
        }
    }

    /// Whether the fault lies with the client's input (4xx-equivalent).
    pub fn is_client_fault(&self) -> bool {
        matches!(self, SessionError::Decode(_) | SessionError::Overrun { .. })
    }
}
