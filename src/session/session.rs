use super::config::SessionConfig;
use super::stats::{ErrorInfo, SessionStats};
use crate::audio::{AudioFrame, DecoderConfig, FrameDecoder, SessionCapture};
use crate::backend::SpeechBackend;
use crate::error::SessionError;
use crate::transcript::{AggregatedTranscript, TranscriptAggregator};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Session lifecycle states.
///
/// `Failed` is reachable from any non-terminal state; `Closed` and `Failed`
/// are terminal and release resources exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Negotiating,
    Streaming,
    Finalizing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Negotiating => "negotiating",
            SessionState::Streaming => "streaming",
            SessionState::Finalizing => "finalizing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// One end-to-end audio-to-transcript session.
///
/// Owns its decoder, backend stream, and aggregator exclusively; nothing is
/// shared across sessions. The send path (client audio to backend) and the
/// receive path (backend events to aggregator) progress as two independent
/// tasks that coordinate only through this session's state.
pub struct StreamingSession {
    config: SessionConfig,

    backend: Arc<dyn SpeechBackend>,

    created_at: chrono::DateTime<chrono::Utc>,

    state: Arc<Mutex<SessionState>>,

    /// First fatal error wins; later ones are logged, not stored
    terminal_error: Arc<Mutex<Option<SessionError>>>,

    decoder: Mutex<FrameDecoder>,

    /// Opt-in WAV capture of the decoded audio
    capture: Arc<Mutex<Option<SessionCapture>>>,

    /// Client-facing end of the bounded frame buffer; taken on close-send
    frame_tx: Mutex<Option<mpsc::Sender<AudioFrame>>>,

    /// While paused, submitted audio is dropped without decoding
    paused: AtomicBool,

    frames_sent: Arc<AtomicU64>,

    /// Latest aggregated transcript, broadcast to any number of watchers
    snapshot_tx: watch::Sender<AggregatedTranscript>,

    send_task: Mutex<Option<JoinHandle<()>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingSession {
    pub fn new(config: SessionConfig, backend: Arc<dyn SpeechBackend>) -> Self {
        let decoder = FrameDecoder::new(DecoderConfig {
            format: config.format,
            frame_duration_ms: config.frame_duration_ms,
        });
        let (snapshot_tx, _) = watch::channel(AggregatedTranscript::default());

        Self {
            config,
            backend,
            created_at: Utc::now(),
            state: Arc::new(Mutex::new(SessionState::Created)),
            terminal_error: Arc::new(Mutex::new(None)),
            decoder: Mutex::new(decoder),
            capture: Arc::new(Mutex::new(None)),
            frame_tx: Mutex::new(None),
            paused: AtomicBool::new(false),
            frames_sent: Arc::new(AtomicU64::new(0)),
            snapshot_tx,
            send_task: Mutex::new(None),
            recv_task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    /// Negotiate with the backend and start the send/receive pumps.
    pub async fn start(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            if *state != SessionState::Created {
                return Err(SessionError::NotStreaming {
                    state: state.as_str(),
                });
            }
            *state = SessionState::Negotiating;
        }

        info!("Negotiating backend stream for session {}", self.id());

        let backend_session = match self
            .backend
            .open(&self.config.format, &self.config.language)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                let err = SessionError::SessionBroken(e);
                error!("Session {} negotiation failed: {}", self.id(), err);
                self.record_error(err).await;
                *self.state.lock().await = SessionState::Failed;
                return Err(SessionError::NotStreaming { state: "failed" });
            }
        };

        if let Some(dir) = &self.config.capture_dir {
            match SessionCapture::create(dir, self.id(), &self.config.format) {
                Ok(c) => *self.capture.lock().await = Some(c),
                // Capture is best-effort persistence, never fatal
                Err(e) => warn!("Session {} capture disabled: {}", self.id(), e),
            }
        }

        let (frame_tx, mut frame_rx) =
            mpsc::channel::<AudioFrame>(self.config.frame_buffer_frames.max(1));
        *self.frame_tx.lock().await = Some(frame_tx);

        // Send pump: drain the bounded frame buffer into the backend,
        // waiting on backend flow control. Frames leave strictly in
        // sequence order because this is the only sender.
        let backend_frames = backend_session.frames;
        let frames_sent = Arc::clone(&self.frames_sent);
        let send_session_id = self.config.session_id.clone();
        let send_task = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let end = frame.end_of_audio;
                if backend_frames.send(frame).await.is_err() {
                    // Stream torn down; the receive pump surfaces the fault
                    warn!("Session {} backend rejected frame, stopping send", send_session_id);
                    break;
                }
                frames_sent.fetch_add(1, Ordering::SeqCst);
                if end {
                    break;
                }
            }
            // Dropping the backend sender here is the close-send signal
        });
        *self.send_task.lock().await = Some(send_task);

        // Receive pump: apply events in arrival order, broadcast snapshots.
        // Tolerance to backend-side reordering lives in the aggregator.
        let mut events = backend_session.events;
        let snapshot_tx = self.snapshot_tx.clone();
        let state = Arc::clone(&self.state);
        let terminal_error = Arc::clone(&self.terminal_error);
        let recv_session_id = self.config.session_id.clone();
        let recv_task = tokio::spawn(async move {
            let mut aggregator = TranscriptAggregator::new();
            while let Some(item) = events.recv().await {
                match item {
                    Ok(event) => match aggregator.apply(event) {
                        Ok(snapshot) => {
                            let _ = snapshot_tx.send(snapshot);
                        }
                        Err(violation) => {
                            error!("Session {}: {}", recv_session_id, violation);
                            let mut slot = terminal_error.lock().await;
                            if slot.is_none() {
                                *slot = Some(violation);
                            }
                            drop(slot);
                            let mut st = state.lock().await;
                            if !st.is_terminal() {
                                *st = SessionState::Failed;
                            }
                            return;
                        }
                    },
                    Err(backend_err) => {
                        error!(
                            "Session {} backend stream broke: {}",
                            recv_session_id, backend_err
                        );
                        let mut slot = terminal_error.lock().await;
                        if slot.is_none() {
                            *slot = Some(SessionError::SessionBroken(backend_err));
                        }
                        drop(slot);
                        let mut st = state.lock().await;
                        if !st.is_terminal() {
                            *st = SessionState::Failed;
                        }
                        return;
                    }
                }
            }
            // Backend closed its event stream: normal end of finalize
        });
        *self.recv_task.lock().await = Some(recv_task);

        *self.state.lock().await = SessionState::Streaming;
        info!("Session {} streaming", self.id());
        Ok(())
    }

    /// Feed one chunk of raw client audio.
    ///
    /// Decode errors and frame-buffer overrun are fatal to the session and
    /// reflected in the returned error; the caller should stop submitting.
    pub async fn submit_audio(&self, bytes: &[u8]) -> Result<(), SessionError> {
        {
            let state = self.state.lock().await;
            if *state != SessionState::Streaming {
                return Err(SessionError::NotStreaming {
                    state: state.as_str(),
                });
            }
        }
        if self.paused.load(Ordering::SeqCst) {
            return Ok(());
        }

        let frames = match self.decoder.lock().await.submit(bytes) {
            Ok(frames) => frames,
            Err(e) => {
                self.fail(SessionError::Decode(e.clone())).await;
                return Err(SessionError::Decode(e));
            }
        };

        for frame in frames {
            self.dispatch_frame(frame).await?;
        }
        Ok(())
    }

    async fn dispatch_frame(&self, frame: AudioFrame) -> Result<(), SessionError> {
        {
            let mut capture = self.capture.lock().await;
            if let Some(c) = capture.as_mut() {
                if let Err(e) = c.write_frame(&frame) {
                    warn!("Session {} capture failed, disabling: {}", self.id(), e);
                    *capture = None;
                }
            }
        }

        let frame_tx = self.frame_tx.lock().await;
        let Some(tx) = frame_tx.as_ref() else {
            let state = self.state.lock().await;
            return Err(SessionError::NotStreaming {
                state: state.as_str(),
            });
        };

        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Fail fast instead of buffering without bound
                drop(frame_tx);
                let err = SessionError::Overrun {
                    capacity: self.config.frame_buffer_frames,
                };
                self.fail(err).await;
                Err(SessionError::Overrun {
                    capacity: self.config.frame_buffer_frames,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                drop(frame_tx);
                let state = self.state.lock().await;
                Err(SessionError::NotStreaming {
                    state: state.as_str(),
                })
            }
        }
    }

    /// Stop forwarding audio without ending the session.
    pub fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::SeqCst)
    }

    /// Resume after `pause`.
    pub fn resume(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    /// End of audio: flush the decoder, close send, and drain remaining
    /// events up to the finalize timeout.
    ///
    /// Always leaves the session in a terminal state. The accumulated
    /// transcript stays available either way.
    pub async fn finish(&self) {
        {
            let mut state = self.state.lock().await;
            match *state {
                SessionState::Streaming => *state = SessionState::Finalizing,
                SessionState::Created | SessionState::Negotiating => {
                    *state = SessionState::Closed;
                    return;
                }
                // Finalizing or already terminal: just make sure resources
                // are gone (close is idempotent)
                _ => {
                    drop(state);
                    self.close().await;
                    return;
                }
            }
        }

        info!("Session {} finalizing", self.id());

        match self.decoder.lock().await.finish() {
            Ok(end_frame) => {
                if let Err(e) = self.dispatch_frame(end_frame).await {
                    warn!("Session {} could not flush end-of-audio frame: {}", self.id(), e);
                }
            }
            Err(e) => {
                self.record_error(SessionError::Decode(e)).await;
            }
        }

        // Close send: the send pump drains whatever is buffered, then drops
        // its backend sender
        self.frame_tx.lock().await.take();

        // One deadline bounds both drains. The send pump can block on
        // backend flow control, so its join needs the timeout too.
        let deadline = tokio::time::Instant::now() + self.config.finalize_timeout;
        let mut timed_out = false;

        if let Some(mut task) = self.send_task.lock().await.take() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Session {} send task panicked: {}", self.id(), e),
                Err(_) => {
                    task.abort();
                    timed_out = true;
                }
            }
        }

        // Whatever deadline budget remains goes to the event-stream flush
        if let Some(mut task) = self.recv_task.lock().await.take() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Session {} receive task panicked: {}", self.id(), e),
                Err(_) => {
                    task.abort();
                    timed_out = true;
                }
            }
        }

        if timed_out {
            warn!(
                "Session {} backend did not finalize within {:?}, force-closing",
                self.id(),
                self.config.finalize_timeout
            );
            self.record_error(SessionError::FinalizeTimeout {
                timeout: self.config.finalize_timeout,
            })
            .await;
        }

        self.close().await;
    }

    /// External cancellation: stop accepting audio at once and trigger
    /// close-send without draining the buffered backlog.
    ///
    /// Unlike `finish`, the decoder is not flushed and undelivered frames
    /// are dropped. The wait for the backend's final flush is bounded by
    /// the same finalize timeout.
    pub async fn cancel(&self) {
        {
            let mut state = self.state.lock().await;
            match *state {
                SessionState::Streaming => *state = SessionState::Finalizing,
                SessionState::Created | SessionState::Negotiating => {
                    *state = SessionState::Closed;
                    return;
                }
                _ => {
                    drop(state);
                    self.close().await;
                    return;
                }
            }
        }

        info!("Session {} cancelled by caller", self.id());

        // Aborting the send pump drops its backend sender along with any
        // frames still queued behind it, which is the close-send signal
        self.frame_tx.lock().await.take();
        if let Some(task) = self.send_task.lock().await.take() {
            task.abort();
        }

        if let Some(mut task) = self.recv_task.lock().await.take() {
            match tokio::time::timeout(self.config.finalize_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Session {} receive task panicked: {}", self.id(), e),
                Err(_) => {
                    task.abort();
                    warn!(
                        "Session {} backend did not flush within {:?} after cancel",
                        self.id(),
                        self.config.finalize_timeout
                    );
                    self.record_error(SessionError::FinalizeTimeout {
                        timeout: self.config.finalize_timeout,
                    })
                    .await;
                }
            }
        }

        self.close().await;
    }

    /// Release resources and settle the terminal state. Idempotent.
    async fn close(&self) {
        // Stop the pumps if they are still around (force-close path)
        if let Some(task) = self.send_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }
        self.frame_tx.lock().await.take();

        if let Some(capture) = self.capture.lock().await.take() {
            match capture.finish() {
                Ok(path) => info!("Session {} audio captured to {:?}", self.id(), path),
                Err(e) => warn!("Session {} capture finalize failed: {}", self.id(), e),
            }
        }

        let failed = self.terminal_error.lock().await.is_some();
        let mut state = self.state.lock().await;
        if !state.is_terminal() {
            *state = if failed {
                SessionState::Failed
            } else {
                SessionState::Closed
            };
        }
        info!("Session {} {}", self.id(), state.as_str());
    }

    async fn record_error(&self, err: SessionError) {
        let mut slot = self.terminal_error.lock().await;
        if slot.is_none() {
            *slot = Some(err);
        } else {
            warn!("Session {} follow-up error ignored: {}", self.id(), err);
        }
    }

    /// Record a fatal error and force the session into `Failed`.
    async fn fail(&self, err: SessionError) {
        error!("Session {} failed: {}", self.id(), err);
        self.record_error(err).await;
        {
            let mut state = self.state.lock().await;
            if !state.is_terminal() {
                *state = SessionState::Failed;
            }
        }
        self.close().await;
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Latest aggregated transcript snapshot.
    pub fn snapshot(&self) -> AggregatedTranscript {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch the transcript as it changes (gateway streaming).
    pub fn subscribe(&self) -> watch::Receiver<AggregatedTranscript> {
        self.snapshot_tx.subscribe()
    }

    /// Terminal error as a client-facing descriptor, if any.
    pub async fn error_info(&self) -> Option<ErrorInfo> {
        self.terminal_error.lock().await.as_ref().map(|e| ErrorInfo {
            code: e.code().to_string(),
            message: e.to_string(),
            client_fault: e.is_client_fault(),
        })
    }

    pub async fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.created_at);
        let snapshot = self.snapshot();

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state().await.as_str().to_string(),
            created_at: self.created_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            finalized_segments: snapshot.segments.len(),
            has_pending_partial: snapshot.pending.is_some(),
            error: self.error_info().await,
        }
    }
}
