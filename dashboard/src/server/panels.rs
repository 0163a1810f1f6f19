use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agents::{AgentsView, PipelineHeader};
use crate::opportunity::{DetailView, FeedView};
use crate::pipeline::RunControl;
use crate::portfolio::{AccountView, PortfolioTotals};
use crate::session::Panel;
use crate::types::OpportunityStatus;

use super::AppState;

/// GET /view/header
pub async fn header(State(state): State<AppState>) -> Json<Panel<PipelineHeader>> {
    Json(state.dashboard.header())
}

/// GET /view/portfolio
pub async fn portfolio(State(state): State<AppState>) -> Json<Panel<PortfolioTotals>> {
    Json(state.dashboard.portfolio())
}

#[derive(Deserialize)]
pub struct FeedQuery {
    /// Restrict to one displayed status, e.g. `recommended`.
    pub status: Option<String>,
}

/// GET /view/opportunities?status=
pub async fn opportunities(
    State(state): State<AppState>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<Panel<FeedView>>, (StatusCode, Json<Value>)> {
    let filter = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match serde_json::from_value::<OpportunityStatus>(Value::String(raw.to_lowercase())) {
            Ok(OpportunityStatus::Unknown) | Err(_) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("Unknown status: {raw}") })),
                ));
            }
            Ok(status) => Some(status),
        },
    };
    Ok(Json(state.dashboard.opportunities(filter)))
}

/// GET /view/detail
pub async fn detail(State(state): State<AppState>) -> Json<Panel<DetailView>> {
    Json(state.dashboard.detail())
}

/// GET /view/agents
pub async fn agents(State(state): State<AppState>) -> Json<Panel<AgentsView>> {
    Json(state.dashboard.agents())
}

/// GET /view/account
pub async fn account(State(state): State<AppState>) -> Json<Panel<AccountView>> {
    Json(state.dashboard.account())
}

/// GET /view/pipeline
pub async fn pipeline(State(state): State<AppState>) -> Json<Panel<RunControl>> {
    Json(state.dashboard.pipeline())
}
