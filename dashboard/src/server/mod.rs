//! Local JSON API a browser view reads panels from and sends commands to.

mod commands;
mod panels;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::session::Dashboard;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

pub const ROUTES: [&str; 14] = [
    "GET  /view/header",
    "GET  /view/portfolio",
    "GET  /view/opportunities?status=",
    "GET  /view/detail",
    "POST /view/select",
    "GET  /view/agents",
    "GET  /view/account",
    "GET  /view/pipeline",
    "POST /view/pipeline/run",
    "POST /view/pipeline/dismiss",
    "POST /view/focus",
    "POST /view/reconnect",
    "POST /view/refresh",
    "GET  /view/health",
];

pub fn router(dashboard: Arc<Dashboard>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Panels
        .route("/view/header", get(panels::header))
        .route("/view/portfolio", get(panels::portfolio))
        .route("/view/opportunities", get(panels::opportunities))
        .route("/view/detail", get(panels::detail))
        .route("/view/agents", get(panels::agents))
        .route("/view/account", get(panels::account))
        .route("/view/pipeline", get(panels::pipeline))
        // Commands
        .route("/view/select", post(commands::select))
        .route("/view/pipeline/run", post(commands::run_pipeline))
        .route("/view/pipeline/dismiss", post(commands::dismiss))
        .route("/view/focus", post(commands::focus))
        .route("/view/reconnect", post(commands::reconnect))
        .route("/view/refresh", post(commands::refresh))
        .route("/view/health", get(health))
        .layer(cors)
        .with_state(AppState { dashboard })
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
