use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::AudioFormat;

/// Configuration for one streaming recognition session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Negotiated audio format for inbound client audio
    pub format: AudioFormat,

    /// Fixed frame duration handed to the backend (default 100ms)
    pub frame_duration_ms: u64,

    /// Bounded capacity of the decoded-frame buffer; exceeding it is a
    /// fatal overrun rather than unbounded growth
    pub frame_buffer_frames: usize,

    /// Bounded wait for remaining events after close-send
    pub finalize_timeout: Duration,

    /// Recognition language passed to the backend
    pub language: String,

    /// When set, decoded audio is also written to a WAV file here
    /// (persistence is strictly opt-in per caller request)
    pub capture_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            format: AudioFormat::default(),
            frame_duration_ms: 100,
            frame_buffer_frames: 50, // 5 seconds of 100ms frames
            finalize_timeout: Duration::from_secs(5),
            language: "ko".to_string(),
            capture_dir: None,
        }
    }
}
