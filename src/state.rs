use std::sync::Arc;
use std::time::Duration;

use crate::push::PushService;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::rooms::RoomRegistry;

/// Shared application state passed to all handlers via axum State extractor.
///
/// The registries are process-wide and initialized empty at service start;
/// [`AppState::shutdown`] is the explicit teardown half of that lifecycle.
#[derive(Clone)]
pub struct AppState {
    /// Active WebSocket connections per user
    pub connections: Arc<ConnectionRegistry>,
    /// Room membership per topic
    pub rooms: Arc<RoomRegistry>,
    /// HS256 secret shared with the token-issuing marketplace API
    pub jwt_secret: Vec<u8>,
    /// Push-notification collaborator
    pub push: Arc<dyn PushService>,
    /// Liveness sweep period
    pub sweep_interval: Duration,
}

impl AppState {
    pub fn new(jwt_secret: Vec<u8>, push: Arc<dyn PushService>, sweep_interval: Duration) -> Self {
        Self {
            connections: Arc::new(ConnectionRegistry::new()),
            rooms: Arc::new(RoomRegistry::new()),
            jwt_secret,
            push,
            sweep_interval,
        }
    }

    /// Close every live connection and drop all registry state.
    pub fn shutdown(&self, reason: &str) {
        self.connections.close_all(reason);
        self.rooms.clear();
    }
}

#[cfg(test)]
impl AppState {
    pub(crate) fn for_tests() -> Self {
        Self::new(
            b"test-secret".to_vec(),
            Arc::new(crate::push::NoopPushService),
            Duration::from_secs(30),
        )
    }
}
