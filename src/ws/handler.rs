use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::session::{self, AuthenticationError, Identity};
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// Auth is via query param ?token=JWT.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Authenticates via query parameter.
/// The token is validated before the upgrade is accepted, so a failed
/// credential refuses the handshake with 401 and never creates a connection.
/// On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match session::authenticate(&state.jwt_secret, &params.token) {
        Ok(identity) => {
            tracing::info!(
                user_id = %identity.user_id,
                role = identity.role.as_str(),
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, identity))
        }
        Err(err) => {
            match err {
                AuthenticationError::Expired => {
                    tracing::warn!("WebSocket auth failed: token expired");
                }
                ref other => {
                    tracing::warn!(error = %other, "WebSocket auth failed");
                }
            }
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Handle an authenticated WebSocket connection by spawning the actor.
async fn handle_authenticated(socket: WebSocket, state: AppState, identity: Identity) {
    actor::run_connection(socket, state, identity).await;
}
