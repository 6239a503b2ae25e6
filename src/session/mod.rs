//! Streaming session management
//!
//! This module provides the `StreamingSession` abstraction that manages:
//! - Decoding client audio chunks into fixed-duration frames
//! - The bidirectional recognition stream (send and receive pumps)
//! - Transcript aggregation and snapshot broadcast
//! - Lifecycle, cancellation, finalize timeout, and error translation

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::{SessionState, StreamingSession};
pub use stats::{ErrorInfo, SessionStats};
