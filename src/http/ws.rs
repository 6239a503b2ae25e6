use super::state::AppState;
use crate::session::{ErrorInfo, SessionConfig, StreamingSession};
use crate::transcript::{AggregatedTranscript, TranscriptSegment};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Client control messages, sent as WebSocket text frames.
/// Binary frames carry the audio bytes themselves.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ControlMessage {
    Start {
        session_id: Option<String>,
        language: Option<String>,
        /// Ask the server to keep a WAV of the session's audio
        capture: Option<bool>,
    },
    Pause,
    Resume,
    Stop,
}

/// Server messages, sent as WebSocket text frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Transcript {
        transcript: AggregatedTranscript,
    },
    Error {
        error: ErrorInfo,
    },
    Done {
        session_id: String,
        full_text: String,
        segments: Vec<TranscriptSegment>,
        segment_count: usize,
    },
}

impl ServerMessage {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            warn!("Failed to serialize server message: {}", e);
            r#"{"type":"error","error":{"code":"internal","message":"serialization failed","client_fault":false}}"#.to_string()
        })
    }
}

/// GET /ws/realtime
/// Realtime streaming recognition over one WebSocket.
pub async fn realtime_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut session: Option<Arc<StreamingSession>> = None;

    // Outbound fan-in: the snapshot forwarder task and the control flow both
    // send through this channel so the socket has a single writer.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(32);

    loop {
        tokio::select! {
            Some(json) = out_rx.recv() => {
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlMessage>(&text) {
                            Ok(control) => {
                                let done = handle_control(
                                    control,
                                    &state,
                                    &mut session,
                                    &out_tx,
                                    &mut socket,
                                )
                                .await;
                                if done {
                                    break;
                                }
                            }
                            Err(e) => {
                                let msg = ServerMessage::Status {
                                    message: format!("unrecognized control message: {e}"),
                                    session_id: None,
                                };
                                if socket.send(Message::Text(msg.to_json())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let Some(active) = &session else {
                            warn!("Audio received before start, dropping {} bytes", bytes.len());
                            continue;
                        };
                        if let Err(e) = active.submit_audio(&bytes).await {
                            warn!("Session {} rejected audio: {}", active.id(), e);
                            // Best-effort partial result plus the explicit
                            // error indicator, then close
                            deliver_failure(active, &mut socket).await;
                            active.cancel().await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        if let Some(active) = &session {
                            active.cancel().await;
                        }
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong handled by axum
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        if let Some(active) = &session {
                            active.cancel().await;
                        }
                        break;
                    }
                }
            }
        }
    }

    // The registry only tracks sessions with a live socket
    if let Some(active) = session {
        let mut sessions = state.sessions.write().await;
        sessions.remove(active.id());
    }
}

/// Returns true when the socket exchange is complete.
async fn handle_control(
    control: ControlMessage,
    state: &AppState,
    session: &mut Option<Arc<StreamingSession>>,
    out_tx: &mpsc::Sender<String>,
    socket: &mut WebSocket,
) -> bool {
    match control {
        ControlMessage::Start {
            session_id,
            language,
            capture,
        } => {
            if session.is_some() {
                let msg = ServerMessage::Status {
                    message: "session already started".to_string(),
                    session_id: None,
                };
                return socket.send(Message::Text(msg.to_json())).await.is_err();
            }

            let config: SessionConfig =
                state
                    .config
                    .session_config(session_id, language, capture.unwrap_or(false));
            let id = config.session_id.clone();
            info!("Starting session {} over WebSocket", id);

            let new_session = Arc::new(StreamingSession::new(config, Arc::clone(&state.backend)));
            if let Err(e) = new_session.start().await {
                warn!("Session {} failed to start: {}", id, e);
                let error = new_session.error_info().await.unwrap_or(ErrorInfo {
                    code: "session_broken".to_string(),
                    message: e.to_string(),
                    client_fault: false,
                });
                let _ = socket
                    .send(Message::Text(ServerMessage::Error { error }.to_json()))
                    .await;
                return true;
            }

            // Forward every transcript change to the socket as it happens
            let mut snapshot_rx = new_session.subscribe();
            let forward_tx = out_tx.clone();
            tokio::spawn(async move {
                while snapshot_rx.changed().await.is_ok() {
                    let transcript = snapshot_rx.borrow_and_update().clone();
                    let json = ServerMessage::Transcript { transcript }.to_json();
                    if forward_tx.send(json).await.is_err() {
                        break;
                    }
                }
            });

            {
                let mut sessions = state.sessions.write().await;
                sessions.insert(id.clone(), Arc::clone(&new_session));
            }
            *session = Some(new_session);

            let msg = ServerMessage::Status {
                message: "recording".to_string(),
                session_id: Some(id),
            };
            socket.send(Message::Text(msg.to_json())).await.is_err()
        }

        ControlMessage::Pause => {
            if let Some(active) = session {
                if active.pause() {
                    let msg = ServerMessage::Status {
                        message: "paused".to_string(),
                        session_id: Some(active.id().to_string()),
                    };
                    return socket.send(Message::Text(msg.to_json())).await.is_err();
                }
            }
            false
        }

        ControlMessage::Resume => {
            if let Some(active) = session {
                if active.resume() {
                    let msg = ServerMessage::Status {
                        message: "resumed".to_string(),
                        session_id: Some(active.id().to_string()),
                    };
                    return socket.send(Message::Text(msg.to_json())).await.is_err();
                }
            }
            false
        }

        ControlMessage::Stop => {
            let Some(active) = session else {
                return true;
            };
            let msg = ServerMessage::Status {
                message: "stopping".to_string(),
                session_id: Some(active.id().to_string()),
            };
            let _ = socket.send(Message::Text(msg.to_json())).await;

            // Drain remaining events up to the finalize timeout
            active.finish().await;

            deliver_done(active, socket).await;
            true
        }
    }
}

/// Final exchange on the happy (or timed-out) stop path: last snapshot, any
/// terminal error, then the done summary.
async fn deliver_done(session: &Arc<StreamingSession>, socket: &mut WebSocket) {
    let snapshot = session.snapshot();

    if let Some(error) = session.error_info().await {
        let _ = socket
            .send(Message::Text(ServerMessage::Error { error }.to_json()))
            .await;
    }

    let done = ServerMessage::Done {
        session_id: session.id().to_string(),
        full_text: snapshot.full_text(),
        segment_count: snapshot.segments.len(),
        segments: snapshot.segments,
    };
    let _ = socket.send(Message::Text(done.to_json())).await;
}

/// Fatal mid-stream failure: the last aggregated snapshot is still delivered
/// alongside the error indicator.
async fn deliver_failure(session: &Arc<StreamingSession>, socket: &mut WebSocket) {
    let transcript = session.snapshot();
    let _ = socket
        .send(Message::Text(
            ServerMessage::Transcript { transcript }.to_json(),
        ))
        .await;

    if let Some(error) = session.error_info().await {
        let _ = socket
            .send(Message::Text(ServerMessage::Error { error }.to_json()))
            .await;
    }
}
