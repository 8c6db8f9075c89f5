use axum::extract::State;
use axum::{Json, Router};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router: the WebSocket upgrade endpoint plus the
/// read-only ops endpoints.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    // Registry introspection for external health/ops tooling
    let ops_routes = Router::new().route("/api/stats", axum::routing::get(stats));

    Router::new()
        .merge(ws_routes)
        .merge(health)
        .merge(ops_routes)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/stats — read-only registry counters.
async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "connections": state.connections.connection_count(),
        "online_users": state.connections.user_count(),
        "rooms": state.rooms.room_count(),
        "room_members": state.rooms.member_counts(),
    }))
}
