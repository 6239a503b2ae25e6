//! Recognition backend client
//!
//! One `BackendSession` owns one bidirectional streaming call: audio frames
//! go in on the `frames` sender, transcript events come out on the `events`
//! receiver. The two directions are pumped by independent tasks; the
//! backend may buffer and emit events on its own schedule, so neither side
//! ever waits for the other in lockstep.

pub mod nest;
pub mod proto;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{AudioFormat, AudioFrame};
use crate::error::BackendError;
use crate::transcript::TranscriptEvent;

/// One live recognition stream.
///
/// Dropping `frames` (or sending a frame flagged `end_of_audio`) is the
/// close-send signal: the backend finalizes and eventually closes `events`.
/// Transport faults after open surface as an `Err` item on `events`.
#[derive(Debug)]
pub struct BackendSession {
    pub frames: mpsc::Sender<AudioFrame>,
    pub events: mpsc::Receiver<Result<TranscriptEvent, BackendError>>,
}

/// Seam between the session manager and the recognition service.
///
/// The production implementation speaks NEST gRPC; tests script one.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Open a recognition stream for the negotiated format.
    ///
    /// Connection establishment and the format/config exchange happen here
    /// and may be retried; once this returns, a transport fault is fatal to
    /// the session (the backend's stream state cannot be rebuilt).
    async fn open(
        &self,
        format: &AudioFormat,
        language: &str,
    ) -> Result<BackendSession, BackendError>;

    /// Probe connectivity for the health endpoint.
    async fn check_connectivity(&self) -> Result<(), BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

pub use nest::{NestBackend, NestBackendConfig, SemanticEpdConfig};
