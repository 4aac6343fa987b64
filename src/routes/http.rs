// HTTP handlers: version, status, one-shot commands

use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;
use crate::models::{ActionRequest, ActionResponse};
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/status: readiness and engine counters.
pub(super) async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.stats())
}

/// POST /api/command: unknown or malformed commands get 400, everything else 200
/// with `{result}` or `{stdout, stderr}`.
pub(super) async fn command_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let request: ActionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "rejected command");
            return (
                StatusCode::BAD_REQUEST,
                Json(ActionResponse::failure(format!(
                    "unknown or malformed command: {}",
                    e
                ))),
            );
        }
    };
    let response = state.orchestrator.dispatch(request).await;
    (StatusCode::OK, Json(response))
}
