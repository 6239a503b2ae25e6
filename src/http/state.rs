use crate::backend::SpeechBackend;
use crate::config::Config;
use crate::session::StreamingSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers.
///
/// The session registry is constructed explicitly and scoped to the server's
/// lifetime; sessions never share state with each other through it.
#[derive(Clone)]
pub struct AppState {
    /// Live recognition sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<StreamingSession>>>>,

    /// Recognition backend shared by all sessions (each opens its own stream)
    pub backend: Arc<dyn SpeechBackend>,

    /// Service configuration, used to derive per-session settings
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Arc<Config>, backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            backend,
            config,
        }
    }
}
