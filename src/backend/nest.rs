use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::codec::Streaming;
use tonic::metadata::MetadataValue;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

use super::proto::{self, nest_service_client::NestServiceClient};
use super::{BackendSession, SpeechBackend};
use crate::audio::AudioFormat;
use crate::error::BackendError;
use crate::transcript::TranscriptEvent;

/// Connection settings for the NEST recognition service.
#[derive(Debug, Clone, Deserialize)]
pub struct NestBackendConfig {
    /// Backend hostname
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Bearer token presented on every stream
    pub client_secret: String,
    /// Default recognition language (BCP-47-ish code, e.g. "ko")
    #[serde(default = "default_language")]
    pub language: String,
    /// Use TLS for the channel (the hosted service requires it)
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Per-direction channel capacity for one stream
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Semantic end-point-detection tuning, passed through in the CONFIG payload
    #[serde(default)]
    pub semantic_epd: SemanticEpdConfig,
}

/// Sentence-boundary detection thresholds understood by NEST.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticEpdConfig {
    /// Silence gap that ends an utterance, in milliseconds
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold_ms: u32,
    /// Hard cap on one utterance's duration, in milliseconds
    #[serde(default = "default_duration_threshold")]
    pub duration_threshold_ms: u32,
    /// Syllable count that forces a boundary
    #[serde(default = "default_syllable_threshold")]
    pub syllable_threshold: u32,
}

fn default_language() -> String {
    "ko".to_string()
}
fn default_true() -> bool {
    true
}
fn default_stream_buffer() -> usize {
    64
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_gap_threshold() -> u32 {
    700
}
fn default_duration_threshold() -> u32 {
    8000
}
fn default_syllable_threshold() -> u32 {
    80
}

impl Default for SemanticEpdConfig {
    fn default() -> Self {
        Self {
            gap_threshold_ms: default_gap_threshold(),
            duration_threshold_ms: default_duration_threshold(),
            syllable_threshold: default_syllable_threshold(),
        }
    }
}

/// gRPC client for the NEST streaming recognizer.
pub struct NestBackend {
    config: NestBackendConfig,
    /// Cumulative stream-open attempts, for logging and diagnostics
    open_attempts: AtomicUsize,
}

impl NestBackend {
    pub fn new(config: NestBackendConfig) -> Self {
        Self {
            config,
            open_attempts: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> Result<Endpoint, BackendError> {
        let scheme = if self.config.use_tls { "https" } else { "http" };
        let uri = format!("{}://{}:{}", scheme, self.config.host, self.config.port);

        let mut endpoint = Endpoint::from_shared(uri)?
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs));
        if self.config.use_tls {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        Ok(endpoint)
    }

    fn config_json(&self, language: &str) -> String {
        let epd = &self.config.semantic_epd;
        serde_json::json!({
            "transcription": { "language": language },
            "semanticEpd": {
                "skipEmptyText": true,
                "useWordEpd": true,
                "usePeriodEpd": true,
                "gapThreshold": epd.gap_threshold_ms,
                "durationThreshold": epd.duration_threshold_ms,
                "syllableThreshold": epd.syllable_threshold,
            },
        })
        .to_string()
    }

    /// Establish a channel and start the recognize stream, config first.
    async fn open_stream(
        &self,
        config_json: &str,
    ) -> Result<(mpsc::Sender<proto::NestRequest>, Streaming<proto::NestResponse>), BackendError>
    {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);

        // A malformed secret can never succeed; reject before dialing
        let token = MetadataValue::try_from(format!("Bearer {}", self.config.client_secret))
            .map_err(|e| BackendError::Credentials(e.to_string()))?;

        let channel = self.endpoint()?.connect().await?;
        let mut client = NestServiceClient::new(channel);

        let (req_tx, req_rx) = mpsc::channel(self.config.stream_buffer.max(1));
        let outbound = tokio_stream::once(proto::NestRequest::config(config_json.to_string()))
            .chain(ReceiverStream::new(req_rx));

        let mut request = tonic::Request::new(outbound);
        request.metadata_mut().insert("authorization", token);

        let response = client.recognize(request).await?;
        Ok((req_tx, response.into_inner()))
    }
}

#[async_trait]
impl SpeechBackend for NestBackend {
    async fn open(
        &self,
        format: &AudioFormat,
        language: &str,
    ) -> Result<BackendSession, BackendError> {
        info!(
            "Opening NEST stream: {}:{} lang={} {}Hz/{}ch",
            self.config.host, self.config.port, language, format.sample_rate, format.channels
        );

        let config_json = self.config_json(language);

        // Nothing has been sent that the backend acknowledged yet, so one
        // fresh-connection retry is safe for transient faults. Definitive
        // rejections fail immediately, and after this point any fault
        // means lost stream state and the session must fail instead.
        let (req_tx, mut inbound) = match self.open_stream(&config_json).await {
            Ok(pair) => pair,
            Err(e) if e.is_transient() => {
                warn!("NEST open failed, retrying once with a fresh connection: {}", e);
                self.open_stream(&config_json).await?
            }
            Err(e) => return Err(e),
        };

        let capacity = self.config.stream_buffer.max(1);
        let (frame_tx, mut frame_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);

        // Outbound pump: frames to DATA requests, strictly in sequence order.
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let frame: crate::audio::AudioFrame = frame;
                let extra = serde_json::json!({
                    "epFlag": frame.end_of_audio,
                    "seqId": frame.sequence,
                })
                .to_string();
                let end = frame.end_of_audio;
                let request = proto::NestRequest::data(frame.to_pcm_bytes(), extra);

                if req_tx.send(request).await.is_err() {
                    // Transport torn down; the inbound pump reports the fault
                    break;
                }
                if end {
                    break;
                }
            }
            debug!("NEST outbound pump finished");
            // Dropping req_tx half-closes the stream (closeSend)
        });

        // Inbound pump: responses to transcript events, in arrival order.
        tokio::spawn(async move {
            let mut mapper = EventMapper::default();
            loop {
                match inbound.message().await {
                    Ok(Some(response)) => match mapper.map_response(&response) {
                        Ok(Some(event)) => {
                            if event_tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = event_tx.send(Err(e)).await;
                            break;
                        }
                    },
                    Ok(None) => {
                        debug!("NEST closed its event stream");
                        break;
                    }
                    Err(status) => {
                        let _ = event_tx.send(Err(BackendError::Rpc(status))).await;
                        break;
                    }
                }
            }
        });

        Ok(BackendSession {
            frames: frame_tx,
            events: event_rx,
        })
    }

    async fn check_connectivity(&self) -> Result<(), BackendError> {
        self.endpoint()?.connect().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "nest-grpc"
    }
}

// ============================================================================
// Response mapping
// ============================================================================

/// Deserialized shape of `NestResponse.contents`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestContents {
    #[serde(default)]
    response_type: serde_json::Value,
    #[serde(default)]
    transcription: Option<NestTranscription>,
}

impl NestContents {
    /// `responseType` arrives as a string or an array depending on version.
    fn has_type(&self, kind: &str) -> bool {
        match &self.response_type {
            serde_json::Value::String(s) => s.contains(kind),
            serde_json::Value::Array(items) => {
                items.iter().any(|v| v.as_str() == Some(kind))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestTranscription {
    #[serde(default)]
    text: String,
    /// Running offset of the hypothesis window end, in milliseconds
    #[serde(default)]
    position: u64,
    #[serde(default)]
    epd_type: String,
    #[serde(default)]
    period_positions: Vec<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    confidence: f32,
}

/// Maps NEST responses onto partial/final transcript events.
///
/// NEST re-sends the full current hypothesis per response rather than
/// deltas, so each transcription maps to one event covering the window from
/// the last finalized boundary to the reported position. Revision indexes
/// restart after each final.
#[derive(Debug, Default)]
struct EventMapper {
    last_final_end_ms: u64,
    partial_revision: u64,
    final_revision: u64,
}

impl EventMapper {
    fn map_response(
        &mut self,
        response: &proto::NestResponse,
    ) -> Result<Option<TranscriptEvent>, BackendError> {
        let contents: NestContents = serde_json::from_str(&response.contents)
            .map_err(|e| BackendError::BadEvent(format!("unparseable contents: {e}")))?;

        if contents.has_type("config") {
            debug!("NEST config acknowledged");
            return Ok(None);
        }
        if !contents.has_type("transcription") {
            return Ok(None);
        }
        let Some(t) = contents.transcription else {
            return Ok(None);
        };
        if t.text.trim().is_empty() {
            return Ok(None);
        }

        let start_ms = self.last_final_end_ms;
        let end_ms = t.position.max(start_ms);

        if is_sentence_end(&t) {
            let revision = self.final_revision;
            self.final_revision += 1;
            self.partial_revision = 0;
            self.last_final_end_ms = end_ms;
            Ok(Some(TranscriptEvent::final_(
                t.text.trim(),
                start_ms,
                end_ms,
                revision,
            )))
        } else {
            let revision = self.partial_revision;
            self.partial_revision += 1;
            Ok(Some(TranscriptEvent::partial(
                t.text.trim(),
                start_ms,
                end_ms,
                revision,
            )))
        }
    }
}

/// Sentence-boundary heuristic over NEST's end-point-detection hints.
fn is_sentence_end(t: &NestTranscription) -> bool {
    let text = t.text.trim();
    let len = text.chars().count();

    // Too short to call a sentence
    if len < 5 {
        return false;
    }
    if matches!(t.epd_type.as_str(), "periodEpd" | "period") {
        return true;
    }
    if !t.period_positions.is_empty() {
        return true;
    }
    if text.ends_with(['.', '?', '!', '。', '！', '？']) {
        return true;
    }
    // Long enough plus a hard boundary hint
    if len >= 10 && matches!(t.epd_type.as_str(), "duration" | "syllable") {
        return true;
    }
    // Very long hypotheses get cut on softer hints
    if len >= 20 && matches!(t.epd_type.as_str(), "gap" | "wordEpd") {
        return true;
    }
    false
}
