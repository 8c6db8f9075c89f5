pub mod actor;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod sweeper;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
