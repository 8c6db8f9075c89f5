//! Liveness sweeper: periodic probe/reap cycle over every open connection.
//!
//! Two-state flag per connection: each cycle clears the flag and sends a
//! transport ping; the actor sets it again when the pong arrives. A
//! connection whose flag is still clear on the next cycle missed a full
//! period and is terminated.

use axum::extract::ws::{CloseFrame, Message};
use tokio::time::interval;

use crate::state::AppState;
use crate::ws::actor;

/// Close code sent to a connection that failed the liveness probe.
const CLOSE_LIVENESS_TIMEOUT: u16 = 4000;

/// Spawn the sweep loop on the configured period.
pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(state.sweep_interval);
        // Skip the first immediate tick
        timer.tick().await;

        loop {
            timer.tick().await;
            sweep(&state);
        }
    })
}

/// One sweep cycle over both registries.
///
/// For every open connection: if the flag is still clear from the previous
/// probe (or the writer task is already gone), force-terminate it;
/// otherwise clear the flag and probe. Afterwards reconcile room
/// membership for users with no live connection, in case lifecycle cleanup
/// was skipped by an abnormal termination.
pub fn sweep(state: &AppState) {
    let mut probed = 0usize;
    let mut reaped = 0usize;

    for (user_id, connections) in state.connections.snapshot() {
        for conn in connections {
            if !conn.is_open() || !conn.take_alive() {
                let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_LIVENESS_TIMEOUT,
                    reason: "liveness timeout".into(),
                })));
                actor::cleanup(state, &conn);
                reaped += 1;
                tracing::info!(
                    user_id = %user_id,
                    connection_id = %conn.id,
                    "reaped unresponsive connection"
                );
            } else {
                let _ = conn.sender.send(Message::Ping(Vec::new().into()));
                probed += 1;
            }
        }
    }

    for user_id in state.rooms.users() {
        if !state.connections.is_online(&user_id) {
            state.rooms.leave_all(&user_id);
            tracing::debug!(user_id = %user_id, "reconciled stale room membership");
        }
    }

    if probed > 0 || reaped > 0 {
        tracing::debug!(probed, reaped, "liveness sweep completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::auth::session::Role;
    use crate::ws::rooms::GLOBAL_ROOM;
    use crate::ws::testutil;

    fn probes(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> (usize, usize) {
        let mut pings = 0;
        let mut closes = 0;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Message::Ping(_) => pings += 1,
                Message::Close(_) => closes += 1,
                _ => {}
            }
        }
        (pings, closes)
    }

    #[test]
    fn silent_connection_reaped_after_exactly_one_full_cycle() {
        let state = AppState::for_tests();
        let (_conn, mut rx) = testutil::attach(&state, "u1", Role::Client);

        // First cycle probes, never terminates a fresh connection
        sweep(&state);
        assert!(state.connections.is_online("u1"));
        assert_eq!(probes(&mut rx), (1, 0));

        // No pong arrived: the second cycle reaps and cascades to rooms
        sweep(&state);
        assert!(!state.connections.is_online("u1"));
        assert!(state.rooms.members_of(GLOBAL_ROOM).is_empty());
        assert_eq!(probes(&mut rx), (0, 1));
    }

    #[test]
    fn responsive_connection_survives_cycles() {
        let state = AppState::for_tests();
        let (conn, mut rx) = testutil::attach(&state, "u1", Role::Client);

        for _ in 0..3 {
            sweep(&state);
            // the actor flips the flag back when the pong arrives
            conn.mark_alive();
        }

        assert!(state.connections.is_online("u1"));
        assert_eq!(probes(&mut rx), (3, 0));
    }

    #[test]
    fn closed_channel_reaped_without_waiting_a_cycle() {
        let state = AppState::for_tests();
        let (_conn, rx) = testutil::attach(&state, "u1", Role::Client);
        drop(rx); // writer task gone

        sweep(&state);

        assert!(!state.connections.is_online("u1"));
    }

    #[test]
    fn reconciliation_purges_membership_without_connections() {
        let state = AppState::for_tests();
        state.rooms.join("ghost", "custom1");

        sweep(&state);

        assert!(state.rooms.members_of("custom1").is_empty());
        assert_eq!(state.rooms.room_count(), 0);
    }
}
