//! HTTP surface: a liveness probe plus the WebSocket upgrade endpoint.

use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws::ws_handler;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
