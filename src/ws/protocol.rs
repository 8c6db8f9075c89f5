//! JSON wire protocol: inbound client messages and outbound envelopes.
//!
//! Inbound frames are `{ "type": ..., ... }` objects. A payload that does
//! not parse, and a recognized envelope with an unrecognized type, both
//! answer with an `error` envelope; neither closes the connection.

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::notify::order::OrderUpdatePayload;
use crate::notify::producers;
use crate::state::AppState;
use crate::ws::registry::Connection;
use crate::ws::router;

/// Message types accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    JoinRoom { room: String },
    LeaveRoom { room: String },
    SubscribePush { subscription: Value },
    OrderUpdate { data: OrderUpdatePayload },
}

const KNOWN_TYPES: &[&str] = &[
    "ping",
    "join_room",
    "leave_room",
    "subscribe_push",
    "order_update",
];

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Parse one inbound text frame, distinguishing a recognized envelope with
/// an unrecognized `type` from a payload that does not parse at all.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, MessageError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MessageError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| MessageError::Malformed("missing \"type\" field".to_string()))?
        .to_string();
    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(MessageError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|e| MessageError::Malformed(e.to_string()))
}

/// Outbound envelope: `{ type, data?, message?, timestamp }`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// ISO-8601 construction time
    pub timestamp: String,
}

impl ServerMessage {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data: None,
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_data(kind: &str, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(kind)
        }
    }

    pub fn with_message(kind: &str, message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::new(kind)
        }
    }

    pub fn error(message: &str) -> Self {
        Self::with_message("error", message)
    }

    /// Serialize into a text frame. The envelope shape rules out
    /// serialization failures, so a broken frame degrades to `{}`.
    pub fn to_ws_message(&self) -> Message {
        let text = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Message::Text(text.into())
    }
}

/// Handle one inbound text frame from an active connection.
pub async fn handle_text_message(text: &str, conn: &Arc<Connection>, state: &AppState) {
    let parsed = match parse_client_message(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(user_id = %conn.user_id, error = %err, "rejected inbound message");
            router::send_to_connection(conn, &ServerMessage::error(&err.to_string()));
            return;
        }
    };

    match parsed {
        ClientMessage::Ping => {
            router::send_to_connection(conn, &ServerMessage::new("pong"));
        }
        ClientMessage::JoinRoom { room } => {
            // A connection may only alter its own membership.
            state.rooms.join(&conn.user_id, &room);
            tracing::debug!(user_id = %conn.user_id, room = %room, "joined room");
        }
        ClientMessage::LeaveRoom { room } => {
            state.rooms.leave(&conn.user_id, &room);
            tracing::debug!(user_id = %conn.user_id, room = %room, "left room");
        }
        ClientMessage::SubscribePush { subscription } => {
            subscribe_push(conn, state, subscription).await;
        }
        ClientMessage::OrderUpdate { data } => {
            producers::notify_order_update(state, &conn.user_id, &data);
        }
    }
}

async fn subscribe_push(conn: &Arc<Connection>, state: &AppState, subscription: Value) {
    match state
        .push
        .save_subscription(&conn.user_id, conn.role, &subscription)
        .await
    {
        Ok(()) => {
            router::send_to_connection(
                conn,
                &ServerMessage::with_message("push_subscription_success", "push subscription saved"),
            );
        }
        Err(err) => {
            tracing::warn!(user_id = %conn.user_id, error = %err, "failed to save push subscription");
            router::send_to_connection(
                conn,
                &ServerMessage::with_message(
                    "push_subscription_error",
                    "failed to save push subscription",
                ),
            );
        }
    }
}
