//! Accepts conversation WebSocket connections.

use super::relay::RelaySession;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one relay session per connection. Sessions share nothing but the
/// read-only state; one failing never affects another.
#[instrument(name = "ws_session", skip_all, fields(session_id, scenario, level))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    info!("New WebSocket connection. Awaiting session parameters...");

    let (socket_tx, socket_rx) = socket.split();
    let end = RelaySession::new(state.relay.clone(), socket_tx, socket_rx)
        .run()
        .await;
    info!(?end, "WebSocket session finished.");
}
