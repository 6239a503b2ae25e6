//! HTTP API server
//!
//! This module exposes the gateway surface:
//! - GET /ws/realtime - bidirectional streaming recognition (WebSocket)
//! - GET /sessions/:id/status - query session status
//! - GET /sessions/:id/transcript - get the accumulated transcript
//! - GET /health - liveness probe (503 while the backend is unreachable)

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
