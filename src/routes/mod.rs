// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator>,
}

pub fn app(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState { orchestrator };
    Router::new()
        .route("/", get(|| async { "dockerbridge: Docker control for remote UIs" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/status", get(http::status_handler)) // GET /api/status
        .route("/api/command", post(http::command_handler)) // POST /api/command
        .route("/ws", get(ws::ws_client)) // WS /ws
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state)
}
