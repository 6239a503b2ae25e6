// End-to-end session lifecycle tests against a scripted backend: happy-path
// finalization, mid-stream faults, finalize timeout, and overrun.

use async_trait::async_trait;
use nest_gateway::{
    AudioFormat, AudioFrame, BackendError, BackendSession, SessionConfig, SessionError,
    SessionState, SpeechBackend, StreamingSession, TranscriptEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Emit a partial every `partial_every` frames, then one final covering
    /// the whole stream when the end-of-audio frame arrives, then close.
    Script { partial_every: u64 },
    /// Emit one partial at frame `frames`, then a transport fault.
    DropAfterFrames { frames: u64 },
    /// Accept all audio but never finalize or close the event stream.
    NeverFinalize,
    /// Accept almost nothing: the stream stalls immediately.
    StallSend,
}

struct MockBackend {
    behavior: Behavior,
    opens: AtomicUsize,
}

impl MockBackend {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            opens: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn open(
        &self,
        _format: &AudioFormat,
        _language: &str,
    ) -> Result<BackendSession, BackendError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior;

        let frame_capacity = match behavior {
            Behavior::StallSend => 1,
            _ => 64,
        };
        let (frame_tx, mut frame_rx) = mpsc::channel::<AudioFrame>(frame_capacity);
        let (event_tx, event_rx) = mpsc::channel::<Result<TranscriptEvent, BackendError>>(64);

        tokio::spawn(async move {
            match behavior {
                Behavior::Script { partial_every } => {
                    let mut frames_seen = 0u64;
                    let mut revision = 0u64;
                    while let Some(frame) = frame_rx.recv().await {
                        if frame.end_of_audio {
                            let _ = event_tx
                                .send(Ok(TranscriptEvent::final_(
                                    "the full utterance.",
                                    0,
                                    frame.offset_ms,
                                    0,
                                )))
                                .await;
                            break;
                        }
                        frames_seen += 1;
                        if frames_seen % partial_every == 0 {
                            let _ = event_tx
                                .send(Ok(TranscriptEvent::partial(
                                    format!("hypothesis after {frames_seen} frames"),
                                    0,
                                    frame.offset_ms + 100,
                                    revision,
                                )))
                                .await;
                            revision += 1;
                        }
                    }
                    // Dropping event_tx closes the event stream
                }
                Behavior::DropAfterFrames { frames } => {
                    let mut frames_seen = 0u64;
                    while let Some(frame) = frame_rx.recv().await {
                        frames_seen += 1;
                        if frames_seen == frames {
                            let _ = event_tx
                                .send(Ok(TranscriptEvent::partial(
                                    "partial before the fault",
                                    0,
                                    frame.offset_ms + 100,
                                    0,
                                )))
                                .await;
                            let _ = event_tx
                                .send(Err(BackendError::BadEvent(
                                    "connection reset by peer".to_string(),
                                )))
                                .await;
                            break;
                        }
                    }
                }
                Behavior::NeverFinalize => {
                    let mut announced = false;
                    while let Some(frame) = frame_rx.recv().await {
                        if !announced {
                            announced = true;
                            let _ = event_tx
                                .send(Ok(TranscriptEvent::partial(
                                    "accumulated so far",
                                    0,
                                    frame.offset_ms + 100,
                                    0,
                                )))
                                .await;
                        }
                        if frame.end_of_audio {
                            break;
                        }
                    }
                    // Hold the event stream open without ever closing it
                    let _hold = event_tx;
                    std::future::pending::<()>().await;
                }
                Behavior::StallSend => {
                    let _hold_frames = frame_rx;
                    let _hold_events = event_tx;
                    std::future::pending::<()>().await;
                }
            }
        });

        Ok(BackendSession {
            frames: frame_tx,
            events: event_rx,
        })
    }

    async fn check_connectivity(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 200ms of 16kHz mono PCM is 3200 samples.
fn pcm_chunk(samples: usize) -> Vec<u8> {
    (0..samples).flat_map(|i| (i as i16).to_le_bytes()).collect()
}

fn test_config() -> SessionConfig {
    SessionConfig {
        session_id: "test-session".to_string(),
        finalize_timeout: Duration::from_secs(2),
        capture_dir: None,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn full_session_yields_one_final_segment() {
    let backend = MockBackend::new(Behavior::Script { partial_every: 5 });
    let session = StreamingSession::new(test_config(), backend.clone());

    session.start().await.unwrap();
    assert_eq!(session.state().await, SessionState::Streaming);

    // 3.5 seconds of audio in 200ms chunks
    let chunk = pcm_chunk(3200);
    for _ in 0..17 {
        session.submit_audio(&chunk).await.unwrap();
    }
    session.submit_audio(&pcm_chunk(1600)).await.unwrap();

    session.finish().await;

    assert_eq!(session.state().await, SessionState::Closed);
    assert!(session.error_info().await.is_none());

    let snapshot = session.snapshot();
    assert_eq!(snapshot.segments.len(), 1);
    assert_eq!(snapshot.segments[0].start_ms, 0);
    assert_eq!(snapshot.segments[0].end_ms, 3500);
    assert!(snapshot.pending.is_none(), "final settles the last partial");
    assert_eq!(snapshot.full_text(), "the full utterance.");

    let stats = session.stats().await;
    // 35 decoded frames plus the end-of-audio marker
    assert_eq!(stats.frames_sent, 36);
    assert_eq!(stats.finalized_segments, 1);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_fault_fails_session_without_reopening() {
    let backend = MockBackend::new(Behavior::DropAfterFrames { frames: 10 });
    let session = StreamingSession::new(test_config(), backend.clone());
    session.start().await.unwrap();

    let chunk = pcm_chunk(3200);
    for _ in 0..17 {
        if session.submit_audio(&chunk).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The receive pump settles the failure asynchronously
    let mut tries = 0;
    while session.state().await != SessionState::Failed && tries < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        tries += 1;
    }

    assert_eq!(session.state().await, SessionState::Failed);
    let error = session.error_info().await.unwrap();
    assert_eq!(error.code, "session_broken");
    assert!(!error.client_fault);

    // Whatever was transcribed before the fault is still available
    let snapshot = session.snapshot();
    assert_eq!(snapshot.pending.unwrap().text, "partial before the fault");

    // A broken stream is never silently reopened mid-session
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn finalize_timeout_force_closes_with_partial_results() {
    let backend = MockBackend::new(Behavior::NeverFinalize);
    let session = StreamingSession::new(test_config(), backend);
    session.start().await.unwrap();

    session.submit_audio(&pcm_chunk(3200)).await.unwrap();
    // Let the scripted partial propagate through the receive pump
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.finish().await;

    assert_eq!(session.state().await, SessionState::Failed);
    let error = session.error_info().await.unwrap();
    assert_eq!(error.code, "finalize_timeout");
    assert!(!error.client_fault);

    // Accumulated results survive the forced close
    let snapshot = session.snapshot();
    assert_eq!(snapshot.pending.unwrap().text, "accumulated so far");
}

#[tokio::test]
async fn overrun_fails_fast_when_backend_stalls() {
    let backend = MockBackend::new(Behavior::StallSend);
    let config = SessionConfig {
        frame_buffer_frames: 2,
        ..test_config()
    };
    let session = StreamingSession::new(config, backend);
    session.start().await.unwrap();

    let chunk = pcm_chunk(3200);
    let mut overran = false;
    for _ in 0..10 {
        match session.submit_audio(&chunk).await {
            Ok(()) => {}
            Err(e) => {
                assert!(matches!(e, SessionError::Overrun { .. }), "got {e}");
                overran = true;
                break;
            }
        }
    }

    assert!(overran, "bounded buffer must reject instead of growing");
    assert_eq!(session.state().await, SessionState::Failed);
    assert_eq!(session.error_info().await.unwrap().code, "overrun");
}

#[tokio::test(start_paused = true)]
async fn finish_is_bounded_when_backend_stops_accepting_frames() {
    let backend = MockBackend::new(Behavior::StallSend);
    let config = SessionConfig {
        finalize_timeout: Duration::from_secs(1),
        ..test_config()
    };
    let session = StreamingSession::new(config, backend);
    session.start().await.unwrap();

    // Two frames: one lodges in the backend channel, one sticks in the pump
    session.submit_audio(&pcm_chunk(3200)).await.unwrap();

    // The send-side drain must honor the finalize deadline too
    tokio::time::timeout(Duration::from_secs(30), session.finish())
        .await
        .expect("finish must return once the finalize timeout elapses");

    assert_eq!(session.state().await, SessionState::Failed);
    assert_eq!(session.error_info().await.unwrap().code, "finalize_timeout");
}

#[tokio::test]
async fn cancel_closes_cleanly_without_finalizing() {
    let backend = MockBackend::new(Behavior::Script { partial_every: 5 });
    let session = StreamingSession::new(test_config(), backend);
    session.start().await.unwrap();

    session.submit_audio(&pcm_chunk(3200)).await.unwrap();
    session.cancel().await;

    // No end-of-audio flush on cancel, so the backend never finalizes
    assert_eq!(session.state().await, SessionState::Closed);
    assert!(session.error_info().await.is_none());
    assert!(session.snapshot().segments.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_is_bounded_when_backend_stalls() {
    let backend = MockBackend::new(Behavior::StallSend);
    let config = SessionConfig {
        finalize_timeout: Duration::from_secs(1),
        ..test_config()
    };
    let session = StreamingSession::new(config, backend);
    session.start().await.unwrap();

    // A backlog the stalled backend will never accept
    for _ in 0..5 {
        session.submit_audio(&pcm_chunk(3200)).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(30), session.cancel())
        .await
        .expect("cancel must drop the backlog instead of draining it");

    assert!(session.state().await.is_terminal());
}

#[tokio::test]
async fn malformed_audio_fails_the_session() {
    let backend = MockBackend::new(Behavior::Script { partial_every: 5 });
    let session = StreamingSession::new(test_config(), backend);
    session.start().await.unwrap();

    // A WAV header claiming an unsupported sample rate
    let mut bad = Vec::new();
    bad.extend_from_slice(b"RIFF");
    bad.extend_from_slice(&36u32.to_le_bytes());
    bad.extend_from_slice(b"WAVE");
    bad.extend_from_slice(b"fmt ");
    bad.extend_from_slice(&16u32.to_le_bytes());
    bad.extend_from_slice(&1u16.to_le_bytes());
    bad.extend_from_slice(&1u16.to_le_bytes());
    bad.extend_from_slice(&44100u32.to_le_bytes());
    bad.extend_from_slice(&88200u32.to_le_bytes());
    bad.extend_from_slice(&2u16.to_le_bytes());
    bad.extend_from_slice(&16u16.to_le_bytes());
    bad.extend_from_slice(b"data");
    bad.extend_from_slice(&0u32.to_le_bytes());

    let err = session.submit_audio(&bad).await.unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));

    assert_eq!(session.state().await, SessionState::Failed);
    let error = session.error_info().await.unwrap();
    assert_eq!(error.code, "decode_error");
    assert!(error.client_fault);
}

#[tokio::test]
async fn paused_audio_is_dropped_without_decoding() {
    let backend = MockBackend::new(Behavior::Script { partial_every: 1 });
    let session = StreamingSession::new(test_config(), backend);
    session.start().await.unwrap();

    assert!(session.pause());
    // Dropped silently, not an error
    session.submit_audio(&pcm_chunk(3200)).await.unwrap();
    assert!(session.resume());
    session.submit_audio(&pcm_chunk(3200)).await.unwrap();

    session.finish().await;

    let stats = session.stats().await;
    // 2 frames from the unpaused chunk plus the end-of-audio marker
    assert_eq!(stats.frames_sent, 3);
    assert_eq!(stats.finalized_segments, 1);
    assert_eq!(session.state().await, SessionState::Closed);
}

#[tokio::test]
async fn audio_is_rejected_outside_streaming() {
    let backend = MockBackend::new(Behavior::Script { partial_every: 5 });
    let session = StreamingSession::new(test_config(), backend);

    let err = session.submit_audio(&pcm_chunk(16)).await.unwrap_err();
    assert!(matches!(err, SessionError::NotStreaming { .. }));

    // Cancel before start closes cleanly
    session.cancel().await;
    assert_eq!(session.state().await, SessionState::Closed);

    let err = session.submit_audio(&pcm_chunk(16)).await.unwrap_err();
    assert!(matches!(err, SessionError::NotStreaming { .. }));
}
