pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transcript;

pub use audio::{AudioEncoding, AudioFormat, AudioFrame, DecoderConfig, FrameDecoder, SessionCapture};
pub use backend::{BackendSession, NestBackend, NestBackendConfig, SpeechBackend};
pub use config::Config;
pub use error::{BackendError, DecodeError, DecodeReason, SessionError};
pub use http::{create_router, AppState};
pub use session::{SessionConfig, SessionState, SessionStats, StreamingSession};
pub use transcript::{
    AggregatedTranscript, TranscriptAggregator, TranscriptEvent, TranscriptEventKind,
    TranscriptSegment,
};
