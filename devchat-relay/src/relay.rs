//! Relay server core: shared state, WebSocket handler, and message routing.
//!
//! Every connection joins the room of its project. Chat messages are fanned
//! out to the other members of that room; messages mentioning the trigger
//! token are also answered by the AI participant, whose reply goes to the
//! whole room.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use devchat_proto::codec::{self, Event};
use devchat_proto::envelope::AiReplyEnvelope;
use devchat_proto::message::ChatMessage;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::ai::AiClient;
use crate::config::RelayConfig;
use crate::rooms::{ConnectionSender, RoomRegistry};
use crate::session::{HandshakeParams, Session};

/// Default maximum accepted inbound frame size in bytes (1 MB).
const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default trigger token.
const DEFAULT_TRIGGER: &str = "@ai";

/// Shared relay server state.
pub struct RelayState {
    /// Room membership.
    pub rooms: RoomRegistry,
    /// AI client answering triggered messages.
    pub ai: Arc<AiClient>,
    /// Substring that routes a message to the AI.
    trigger: String,
    /// Maximum accepted inbound frame size in bytes.
    max_frame_size: usize,
}

impl RelayState {
    /// Creates relay state around an AI client with default limits.
    #[must_use]
    pub fn new(ai: AiClient) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            ai: Arc::new(ai),
            trigger: DEFAULT_TRIGGER.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Creates relay state using the trigger and frame limit from `config`.
    #[must_use]
    pub fn with_config(config: &RelayConfig, ai: AiClient) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            ai: Arc::new(ai),
            trigger: config.trigger.clone(),
            max_frame_size: config.max_frame_size,
        }
    }

    /// Returns the trigger token.
    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.trigger
    }
}

/// Handles an upgraded WebSocket connection for a single session.
///
/// The connection lifecycle:
/// 1. Join the session's room.
/// 2. Forward queued outbound frames from a writer task.
/// 3. Route inbound frames until the socket closes.
/// 4. Leave the room.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, session: Session) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create a channel for sending messages to this connection's writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let members = state.rooms.join(&session.room, session.id, tx.clone()).await;
    tracing::info!(
        conn_id = %session.id,
        room = %session.room,
        user = %session.user_id,
        members = members,
        "connection joined room"
    );

    // Spawn a writer task that forwards messages from the channel to the WebSocket.
    let writer_conn_id = session.id;
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id = %writer_conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming frames from this connection.
    let reader_session = session.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_frame(&reader_session, text.as_str(), &tx, &reader_state).await;
                }
                Message::Binary(data) => {
                    tracing::warn!(
                        conn_id = %reader_session.id,
                        len = data.len(),
                        "binary frames are not supported"
                    );
                    send_event(&tx, &Event::error("binary frames are not supported"));
                }
                Message::Close(_) => {
                    tracing::info!(conn_id = %reader_session.id, "received close frame");
                    break;
                }
                _ => {
                    // Ping/pong are answered by axum.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.rooms.leave(&session.room, session.id).await;
    tracing::info!(
        conn_id = %session.id,
        room = %session.room,
        "connection left room"
    );
}

/// Handles one text frame from a joined connection.
async fn handle_text_frame(
    session: &Session,
    text: &str,
    reply: &ConnectionSender,
    state: &Arc<RelayState>,
) {
    if text.len() > state.max_frame_size {
        tracing::warn!(
            conn_id = %session.id,
            size = text.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        send_event(
            reply,
            &Event::error(format!(
                "frame too large: {} bytes (max {})",
                text.len(),
                state.max_frame_size
            )),
        );
        return;
    }

    let msg = match codec::decode(text) {
        Ok(Event::ProjectMessage(msg)) => msg,
        Ok(other) => {
            tracing::warn!(conn_id = %session.id, event = ?other, "unexpected event from client");
            send_event(reply, &Event::error("unexpected event"));
            return;
        }
        Err(e) => {
            tracing::warn!(conn_id = %session.id, error = %e, "failed to decode frame");
            send_event(reply, &Event::error(e.to_string()));
            return;
        }
    };

    if let Err(e) = msg.validate_inbound() {
        tracing::warn!(conn_id = %session.id, error = %e, "rejected message");
        send_event(reply, &Event::error(e.to_string()));
        return;
    }

    // Peers get the frame exactly as the sender wrote it.
    let delivered = state.rooms.broadcast(&session.room, text, Some(session.id)).await;
    tracing::debug!(
        conn_id = %session.id,
        room = %session.room,
        delivered = delivered,
        "message relayed"
    );

    if msg.mentions(&state.trigger) {
        let prompt = msg.strip_trigger(&state.trigger);
        spawn_ai_reply(state, session.room.clone(), prompt);
    }
}

/// Generates an AI reply off the reader task and sends it to the whole room.
///
/// Exactly one AI message is emitted per call: if generation panics, the
/// fallback envelope is sent instead.
fn spawn_ai_reply(state: &Arc<RelayState>, room: String, prompt: String) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        tracing::info!(room = %room, prompt_len = prompt.len(), "AI request");

        let ai = Arc::clone(&state.ai);
        let envelope = match AssertUnwindSafe(ai.generate(&prompt)).catch_unwind().await {
            Ok(json) => json,
            Err(_) => {
                tracing::error!(room = %room, "AI generation panicked, sending fallback");
                AiReplyEnvelope::fallback().to_json()
            }
        };

        let event = Event::ProjectMessage(ChatMessage::from_ai(envelope));
        match codec::encode(&event) {
            Ok(text) => {
                let delivered = state.rooms.broadcast(&room, &text, None).await;
                tracing::info!(room = %room, delivered = delivered, "AI reply sent");
            }
            Err(e) => {
                tracing::error!(room = %room, error = %e, "failed to encode AI reply");
            }
        }
    });
}

/// Encodes an event and queues it on a single connection.
fn send_event(sender: &ConnectionSender, event: &Event) {
    if let Ok(text) = codec::encode(event) {
        let _ = sender.send(Message::Text(text.into()));
    }
}

/// Builds the axum router serving `/ws` and the HTTP API.
pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .merge(crate::api::routes())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Starts the relay server on the given address with an AI client built
/// from default settings, and returns the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let ai = AiClient::new(crate::ai::AiSettings::default());
    start_server_with_state(addr, Arc::new(RelayState::new(ai))).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket session.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::Query(params): axum::extract::Query<HandshakeParams>,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    let session = Session::from_handshake(&params);
    ws.on_upgrade(move |socket| handle_socket(socket, state, session))
}
