use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::TriggerError;

use super::AppState;

#[derive(Deserialize)]
pub struct SelectRequest {
    /// `null` or absent deselects.
    #[serde(default)]
    pub id: Option<String>,
}

/// POST /view/select
pub async fn select(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Json<Value> {
    let changed = state.dashboard.select(req.id);
    Json(json!({
        "selected": state.dashboard.selected(),
        "changed": changed
    }))
}

/// POST /view/pipeline/run
///
/// 202 once the backend accepted the run, 409 while one is active, 502 for
/// any other backend failure.
pub async fn run_pipeline(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.dashboard.run_pipeline().await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))),
        Err(e @ TriggerError::AlreadyRunning) => {
            (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() })))
        }
        Err(e @ TriggerError::StartFailed { .. }) => {
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
        }
    }
}

/// POST /view/pipeline/dismiss
pub async fn dismiss(State(state): State<AppState>) -> Json<Value> {
    state.dashboard.dismiss_pipeline_error();
    Json(json!({ "status": "dismissed" }))
}

/// POST /view/focus
pub async fn focus(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "accepted": state.dashboard.focus() }))
}

/// POST /view/reconnect
pub async fn reconnect(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "accepted": state.dashboard.reconnect() }))
}

/// POST /view/refresh
pub async fn refresh(State(state): State<AppState>) -> Json<Value> {
    let refreshed = state.dashboard.refresh_all();
    info!("Manual refresh of {refreshed} resources");
    Json(json!({ "refreshed": refreshed }))
}
