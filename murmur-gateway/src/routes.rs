use crate::AppState;
use crate::session;

use axum::{
    extract::{
        State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use std::sync::Arc;

#[debug_handler]
pub(crate) async fn available(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.registry.is_full() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

#[debug_handler]
pub(crate) async fn connections(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    (StatusCode::OK, state.registry.count().to_string())
}

/// Game socket. A plain GET without upgrade headers is treated like any
/// other unknown path.
pub(crate) async fn socket(
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| session::run(socket, state)),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
