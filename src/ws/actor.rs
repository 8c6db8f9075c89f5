use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::auth::session::Identity;
use crate::state::AppState;
use crate::ws::protocol::{self, ServerMessage};
use crate::ws::registry::Connection;
use crate::ws::rooms;
use crate::ws::router;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: processes incoming messages, dispatches to protocol handlers
///
/// The mpsc sender lives on the [`Connection`] record, so any part of the
/// system can push messages to this client through the registry.
pub async fn run_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let conn = Arc::new(Connection::new(
        identity.user_id,
        identity.role,
        tx.clone(),
    ));

    // Register this connection and join the default rooms for its role
    state.connections.register(conn.clone());
    let joined = rooms::default_rooms(conn.role, &conn.user_id);
    for room in &joined {
        state.rooms.join(&conn.user_id, room);
    }

    // Acknowledge the session. The ack carries the default membership so a
    // reconnecting client can confirm it was re-established.
    router::send_to_connection(
        &conn,
        &ServerMessage::with_data(
            "connection",
            json!({
                "user_id": conn.user_id,
                "role": conn.role.as_str(),
                "rooms": joined,
            }),
        ),
    );

    tracing::info!(
        user_id = %conn.user_id,
        role = conn.role.as_str(),
        connection_id = %conn.id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Reader loop: one inbound message is processed to completion before the
    // next is read.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &conn, &state).await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %conn.user_id,
                        "ignoring binary frame on a JSON protocol"
                    );
                }
                Message::Pong(_) => {
                    // Answer to the liveness sweeper's probe
                    conn.mark_alive();
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %conn.user_id,
                        reason = ?frame,
                        "client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %conn.user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended, client disconnected
                tracing::info!(user_id = %conn.user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();

    cleanup(&state, &conn);

    tracing::info!(
        user_id = %conn.user_id,
        connection_id = %conn.id,
        "WebSocket actor stopped"
    );
}

/// Deregister the connection and, when it was the user's last one, purge the
/// user's room membership. Closed is terminal; a reconnecting client builds
/// a brand-new connection through the normal handshake path.
pub fn cleanup(state: &AppState, conn: &Connection) {
    if state.connections.deregister(&conn.user_id, conn.id) {
        state.rooms.leave_all(&conn.user_id);
        tracing::debug!(
            user_id = %conn.user_id,
            "last connection closed, room membership purged"
        );
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
