//! Message router: resolves rooms and users to live connections and pushes
//! frames to them.
//!
//! Read-only over the registries. Dead connections encountered during a
//! send are tolerated, not purged; reaping is the liveness sweeper's job.

use crate::state::AppState;
use crate::ws::protocol::ServerMessage;
use crate::ws::registry::Connection;
use crate::ws::rooms::GLOBAL_ROOM;

/// Deliver to a single connection if its transport channel is still open.
/// Send failures are dropped silently; disconnection is expected and handled
/// by the lifecycle, not here.
pub fn send_to_connection(conn: &Connection, envelope: &ServerMessage) {
    if !conn.is_open() {
        return;
    }
    let _ = conn.sender.send(envelope.to_ws_message());
}

/// Deliver to every live connection of one user. Returns whether at least
/// one connection received the frame; producers use this to decide whether
/// an out-of-band push is needed.
pub fn send_to_user(state: &AppState, user_id: &str, envelope: &ServerMessage) -> bool {
    let frame = envelope.to_ws_message();
    let mut delivered = false;
    for conn in state.connections.connections_of(user_id) {
        if conn.is_open() && conn.sender.send(frame.clone()).is_ok() {
            delivered = true;
        }
    }
    delivered
}

/// Deliver to every member of a room, except the optionally excluded sender.
/// Returns the number of distinct users reached; a user with several devices
/// counts once however many of their connections received the frame.
pub fn send_to_room(
    state: &AppState,
    room: &str,
    envelope: &ServerMessage,
    exclude_user: Option<&str>,
) -> usize {
    let frame = envelope.to_ws_message();
    let mut reached = 0;
    for member in state.rooms.members_of(room) {
        if exclude_user == Some(member.as_str()) {
            continue;
        }
        let mut hit = false;
        for conn in state.connections.connections_of(&member) {
            if conn.is_open() && conn.sender.send(frame.clone()).is_ok() {
                hit = true;
            }
        }
        if hit {
            reached += 1;
        }
    }
    reached
}

/// Deliver to every member of the global broadcast room.
pub fn broadcast(state: &AppState, envelope: &ServerMessage, exclude_user: Option<&str>) -> usize {
    send_to_room(state, GLOBAL_ROOM, envelope, exclude_user)
}
