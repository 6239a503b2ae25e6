use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a session for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Current lifecycle state
    pub state: String,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Seconds since creation
    pub duration_secs: f64,

    /// Frames handed to the backend so far
    pub frames_sent: u64,

    /// Finalized transcript segments accumulated so far
    pub finalized_segments: usize,

    /// Whether a revisable partial hypothesis is outstanding
    pub has_pending_partial: bool,

    /// Terminal error, if the session failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Client-facing error descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine-readable code (e.g. "session_broken")
    pub code: String,
    pub message: String,
    /// True when the fault lies with the client's input
    pub client_fault: bool,
}
