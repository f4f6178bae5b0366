//! WebSocket transport for one document's change feed.
//!
//! A connected client receives every `SessionEvent` for the document as a
//! JSON text frame and drives its own session through `ClientMessage`
//! frames. The server pings every 30 seconds and drops peers that stay
//! silent past the timeout; a dropped or closed socket deletes the peer's
//! session row, the same cleanup an explicit `Leave` performs.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use ts_rs::TS;
use uuid::Uuid;

use crate::channel::{ChangeChannel, SessionEvent};
use crate::identity::Identity;
use crate::presence::color;
use crate::server::AppState;
use crate::session::memory::MemorySessionStore;
use crate::session::{CollaborationSession, CursorPosition, NewSession, SessionStore};
use crate::{DocumentId, SessionId, UserId};

const SERVER_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
const SERVER_HEARTBEAT_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    Join {
        user_id: UserId,
        user_email: String,
        user_name: Option<String>,
        tab_id: Uuid,
    },
    Cursor {
        position: CursorPosition,
    },
    Focus {
        slide_index: usize,
    },
    Heartbeat,
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    Joined { session: CollaborationSession },
    Change(SessionEvent),
}

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// GET /ws/documents/{document_id}
pub async fn document_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> impl IntoResponse {
    tracing::info!(%document_id, "new WebSocket connection");
    ws.on_upgrade(move |socket| handle_socket(socket, state, document_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, document_id: DocumentId) {
    let sessions = Arc::clone(&state.sessions);
    let mut subscription = match sessions.subscribe(&document_id).await {
        Ok(subscription) => subscription,
        Err(error) => {
            tracing::warn!(%document_id, %error, "failed to subscribe to change feed");
            return;
        }
    };

    let (ws_sender, ws_receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(ws_sender));
    let joined: Arc<Mutex<Option<SessionId>>> = Arc::new(Mutex::new(None));
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    // Change feed -> socket.
    let feed_sender = Arc::clone(&ws_sender);
    let feed_document_id = document_id.clone();
    let mut feed_task: JoinHandle<()> = tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Ok(event) => {
                    let frame = match serde_json::to_string(&ServerMessage::Change(event)) {
                        Ok(frame) => frame,
                        Err(error) => {
                            tracing::error!(document_id = %feed_document_id, %error, "failed to serialize event");
                            continue;
                        }
                    };
                    let mut guard = feed_sender.lock().await;
                    if guard.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(document_id = %feed_document_id, skipped, "event feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Socket -> session store.
    let recv_sessions = Arc::clone(&sessions);
    let recv_sender = Arc::clone(&ws_sender);
    let recv_joined = Arc::clone(&joined);
    let recv_last_pong = Arc::clone(&last_pong);
    let recv_document_id = document_id.clone();
    let mut recv_task: JoinHandle<()> = tokio::spawn(async move {
        receive_loop(
            ws_receiver,
            recv_sessions,
            recv_sender,
            recv_joined,
            recv_last_pong,
            recv_document_id,
        )
        .await;
    });

    // Server-side liveness pings.
    let ping_sender = Arc::clone(&ws_sender);
    let ping_last_pong = Arc::clone(&last_pong);
    let ping_document_id = document_id.clone();
    let mut ping_task: JoinHandle<()> = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(SERVER_HEARTBEAT_INTERVAL_SECONDS));
        ticker.tick().await;
        let timeout = Duration::from_secs(SERVER_HEARTBEAT_TIMEOUT_SECONDS);
        loop {
            ticker.tick().await;
            if ping_last_pong.lock().await.elapsed() > timeout {
                tracing::warn!(document_id = %ping_document_id, "heartbeat timeout; disconnecting peer");
                break;
            }
            let mut guard = ping_sender.lock().await;
            if guard.send(Message::Ping(Vec::new().into())).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut feed_task => { recv_task.abort(); ping_task.abort(); }
        _ = &mut recv_task => { feed_task.abort(); ping_task.abort(); }
        _ = &mut ping_task => { feed_task.abort(); recv_task.abort(); }
    }

    // Best-effort socket close, then session cleanup: a crashed tab that
    // never sent Leave still gets its row removed when the socket dies.
    {
        let mut guard = ws_sender.lock().await;
        let _ = guard.close().await;
    }
    let leftover = joined.lock().await.take();
    if let Some(session_id) = leftover {
        if let Err(error) = sessions.delete(session_id).await {
            tracing::debug!(%session_id, %error, "session cleanup after disconnect failed");
        }
        tracing::info!(%session_id, %document_id, "client disconnected; session removed");
    }
}

async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    sessions: Arc<MemorySessionStore>,
    sender: WsSender,
    joined: Arc<Mutex<Option<SessionId>>>,
    last_pong: Arc<Mutex<Instant>>,
    document_id: DocumentId,
) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    handle_client_message(&sessions, &sender, &joined, &document_id, message).await;
                }
                Err(error) => {
                    tracing::warn!(%document_id, %error, raw = %text, "unparseable client message");
                }
            },
            Ok(Message::Pong(_)) => {
                *last_pong.lock().await = Instant::now();
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(%document_id, ?frame, "client closed connection");
                break;
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%document_id, %error, "WebSocket receive error");
                break;
            }
        }
    }
}

async fn handle_client_message(
    sessions: &Arc<MemorySessionStore>,
    sender: &WsSender,
    joined: &Arc<Mutex<Option<SessionId>>>,
    document_id: &DocumentId,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Join {
            user_id,
            user_email,
            user_name,
            tab_id,
        } => {
            let mut identity = Identity::new(user_id, user_email);
            if let Some(name) = user_name {
                identity = identity.with_name(name);
            }
            let new = NewSession {
                document_id: document_id.clone(),
                user_id: identity.user_id.clone(),
                user_email: identity.email.clone(),
                user_name: identity.display_name(),
                tab_id,
                color: color::pick_color(),
            };
            match sessions.upsert(new).await {
                Ok(session) => {
                    *joined.lock().await = Some(session.id);
                    send_message(sender, &ServerMessage::Joined { session }).await;
                }
                Err(error) => {
                    tracing::warn!(%document_id, %error, "join failed");
                }
            }
        }
        ClientMessage::Cursor { position } => {
            if let Some(session_id) = *joined.lock().await {
                if let Err(error) = sessions.update_cursor(session_id, position).await {
                    tracing::debug!(%session_id, %error, "cursor update dropped");
                }
            }
        }
        ClientMessage::Focus { slide_index } => {
            if let Some(session_id) = *joined.lock().await {
                if let Err(error) = sessions.update_focused_slide(session_id, slide_index).await {
                    tracing::debug!(%session_id, %error, "focus update dropped");
                }
            }
        }
        ClientMessage::Heartbeat => {
            if let Some(session_id) = *joined.lock().await {
                if let Err(error) = sessions.touch(session_id).await {
                    tracing::debug!(%session_id, %error, "heartbeat dropped");
                }
            }
        }
        ClientMessage::Leave => {
            if let Some(session_id) = joined.lock().await.take() {
                if let Err(error) = sessions.delete(session_id).await {
                    tracing::debug!(%session_id, %error, "leave cleanup failed");
                }
            }
        }
    }
}

async fn send_message(sender: &WsSender, message: &ServerMessage) {
    let frame = match serde_json::to_string(message) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::error!(%error, "failed to serialize server message");
            return;
        }
    };
    let mut guard = sender.lock().await;
    if let Err(error) = guard.send(Message::Text(frame.into())).await {
        tracing::debug!(%error, "failed to send server message");
    }
}
