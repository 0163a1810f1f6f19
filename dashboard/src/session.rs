//! One dashboard session: every panel's subscription, the opportunity selection
//! and the run trigger, behind the read/command surface a view talks to.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use crate::agents::{agents_view, pipeline_header, AgentsView, PipelineHeader};
use crate::cache::{CacheSettings, PollOptions, PollingCache, Snapshot, Subscription};
use crate::client::ResourceClient;
use crate::config::{Config, RefreshPlan};
use crate::error::TriggerError;
use crate::opportunity::{feed_view, DetailView, FeedView, OpportunitySelection};
use crate::pipeline::{PipelineTrigger, RunControl};
use crate::portfolio::{account_view, portfolio_totals, AccountView, PortfolioTotals};
use crate::resource::ResourceKey;
use crate::types::{
    ActivityItem, AgentStatusResponse, ColiseumConfig, KalshiBalance, KalshiOrder,
    KalshiPosition, OpportunityStatus, OpportunitySummary, PipelineStatus, PortfolioState,
};

/// A panel as the view receives it: derived data plus the state of the
/// entries it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct Panel<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub failing: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct Meta {
    loading: bool,
    error: Option<String>,
    failing: bool,
    fetched_at: Option<DateTime<Utc>>,
}

impl Meta {
    fn of<S>(snap: &Snapshot<S>) -> Self {
        Self {
            loading: snap.is_loading,
            error: snap.error.as_ref().map(ToString::to_string),
            failing: snap.failing,
            fetched_at: snap.fetched_at,
        }
    }

    /// Panels fed by several keys: loading or failing if any part is, first
    /// error wins, oldest fetch time.
    fn and(self, other: Meta) -> Self {
        Self {
            loading: self.loading || other.loading,
            error: self.error.or(other.error),
            failing: self.failing || other.failing,
            fetched_at: match (self.fetched_at, other.fetched_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }

    fn panel<T>(self, data: Option<T>) -> Panel<T> {
        Panel {
            data,
            loading: self.loading,
            error: self.error,
            failing: self.failing,
            fetched_at: self.fetched_at,
        }
    }
}

pub struct Dashboard {
    config: Config,
    cache: PollingCache,
    portfolio: Subscription<PortfolioState>,
    settings: Subscription<ColiseumConfig>,
    opportunities: Subscription<Vec<OpportunitySummary>>,
    agents: Subscription<AgentStatusResponse>,
    activity: Subscription<Vec<ActivityItem>>,
    balance: Subscription<KalshiBalance>,
    positions: Subscription<Vec<KalshiPosition>>,
    orders: Subscription<Vec<KalshiOrder>>,
    pipeline_status: Subscription<PipelineStatus>,
    selection: Mutex<OpportunitySelection>,
    trigger: PipelineTrigger,
}

impl Dashboard {
    /// Subscribe to every panel resource. Must run inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let client = ResourceClient::new(
            &config.api_base,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let cache = PollingCache::new(CacheSettings::from(&config));
        let plan = &config.refresh;

        let portfolio = cache.subscribe(
            Some(ResourceKey::PortfolioState),
            client.first_getter(config.portfolio_paths.clone()),
            PollOptions::every(plan.interval(&ResourceKey::PortfolioState)),
        );
        let settings = watch(&cache, &client, plan, ResourceKey::Config);
        let opportunities = watch(&cache, &client, plan, ResourceKey::Opportunities);
        let agents = watch(&cache, &client, plan, ResourceKey::AgentStatus);
        let activity = watch(&cache, &client, plan, ResourceKey::AgentActivity);
        let balance = watch(&cache, &client, plan, ResourceKey::KalshiBalance);
        let positions = watch(&cache, &client, plan, ResourceKey::KalshiPositions);
        let orders = watch(&cache, &client, plan, ResourceKey::KalshiOrders);
        let pipeline_status = watch(&cache, &client, plan, ResourceKey::PipelineStatus);

        let detail_interval = plan.interval(&ResourceKey::Opportunity(String::new()));
        let selection = OpportunitySelection::new(cache.clone(), client.clone(), detail_interval);
        let trigger = PipelineTrigger::new(client, cache.clone());

        info!(
            "Watching {} resources on {}",
            cache.active_keys().len(),
            config.api_base
        );

        Ok(Self {
            config,
            cache,
            portfolio,
            settings,
            opportunities,
            agents,
            activity,
            balance,
            positions,
            orders,
            pipeline_status,
            selection: Mutex::new(selection),
            trigger,
        })
    }

    pub fn cache(&self) -> &PollingCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn header(&self) -> Panel<PipelineHeader> {
        let settings = self.settings.snapshot();
        let agents = self.agents.snapshot();
        let header = pipeline_header(settings.data.as_deref(), agents.data.as_deref());
        Meta::of(&settings).and(Meta::of(&agents)).panel(Some(header))
    }

    pub fn portfolio(&self) -> Panel<PortfolioTotals> {
        let snap = self.portfolio.snapshot();
        Meta::of(&snap).panel(Some(portfolio_totals(snap.data.as_deref())))
    }

    pub fn opportunities(&self, filter: Option<OpportunityStatus>) -> Panel<FeedView> {
        let snap = self.opportunities.snapshot();
        let selection = self.selection();
        let feed = snap
            .data
            .as_deref()
            .map(|opps| feed_view(opps, selection.selected(), filter, Utc::now()));
        Meta::of(&snap).panel(feed)
    }

    /// Select an opportunity, or deselect with `None`.
    pub fn select(&self, id: Option<String>) -> bool {
        self.selection().select(id)
    }

    pub fn selected(&self) -> Option<String> {
        self.selection().selected().map(str::to_string)
    }

    pub fn detail(&self) -> Panel<DetailView> {
        let selection = self.selection();
        let snap = selection.snapshot();
        Meta::of(&snap).panel(Some(selection.view(Utc::now())))
    }

    pub fn agents(&self) -> Panel<AgentsView> {
        let status = self.agents.snapshot();
        let activity = self.activity.snapshot();
        let view = agents_view(
            status.data.as_deref(),
            activity.data.as_deref().map(Vec::as_slice),
            self.config.activity_limit,
        );
        Meta::of(&status).and(Meta::of(&activity)).panel(Some(view))
    }

    pub fn account(&self) -> Panel<AccountView> {
        let balance = self.balance.snapshot();
        let positions = self.positions.snapshot();
        let orders = self.orders.snapshot();
        let view = account_view(
            balance.data.as_deref(),
            positions.data.as_deref().map(Vec::as_slice),
            orders.data.as_deref().map(Vec::as_slice),
        );
        Meta::of(&balance)
            .and(Meta::of(&positions))
            .and(Meta::of(&orders))
            .panel(Some(view))
    }

    pub fn pipeline(&self) -> Panel<RunControl> {
        let snap = self.pipeline_status.snapshot();
        let control = self.trigger.control(snap.data.as_deref());
        Meta::of(&snap).panel(Some(control))
    }

    pub async fn run_pipeline(&self) -> Result<(), TriggerError> {
        self.trigger.run_pipeline().await
    }

    pub fn dismiss_pipeline_error(&self) {
        self.trigger.dismiss_error();
    }

    pub fn focus(&self) -> bool {
        self.cache.sink().focus()
    }

    pub fn reconnect(&self) -> bool {
        self.cache.sink().reconnect()
    }

    /// Manual refresh of every active key.
    pub fn refresh_all(&self) -> usize {
        let keys = self.cache.active_keys();
        for key in &keys {
            self.cache.revalidate(key);
        }
        keys.len()
    }

    /// True once every panel resource has data or an error, false on timeout.
    pub async fn wait_until_loaded(&self, timeout: Duration) -> bool {
        let mut updates = self.cache.updates();
        let wait = async {
            while !self.loaded() {
                if updates.changed().await.is_err() {
                    break;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok() && self.loaded()
    }

    fn loaded(&self) -> bool {
        answered(&self.portfolio)
            && answered(&self.settings)
            && answered(&self.opportunities)
            && answered(&self.agents)
            && answered(&self.activity)
            && answered(&self.balance)
            && answered(&self.positions)
            && answered(&self.orders)
            && answered(&self.pipeline_status)
    }

    fn selection(&self) -> MutexGuard<'_, OpportunitySelection> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn watch<T>(
    cache: &PollingCache,
    client: &ResourceClient,
    plan: &RefreshPlan,
    key: ResourceKey,
) -> Subscription<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let options = PollOptions::every(plan.interval(&key));
    let fetch = client.getter::<T>(key.path());
    cache.subscribe(Some(key), fetch, options)
}

fn answered<T: Send + Sync + 'static>(sub: &Subscription<T>) -> bool {
    let snap = sub.snapshot();
    snap.data.is_some() || snap.error.is_some()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small in-process Coliseum backend.

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::config::Config;

    pub fn backend() -> Router {
        Router::new()
            .route(
                "/api/state",
                get(|| async {
                    Json(json!({
                        "last_updated": "2026-10-16 09:00:00+00:00",
                        "portfolio": {"total_value": 150.5, "cash_balance": 100.0, "positions_value": 50.5},
                        "open_positions": [
                            {"id": "p1", "market_ticker": "KX-A", "side": "YES", "contracts": 10, "average_entry": 0.4},
                            {"id": "p2", "market_ticker": "KX-B", "side": "NO", "contracts": 5, "average_entry": 0.3}
                        ],
                        "closed_positions": [{"pnl": 10.0}, {"pnl": -4.0}]
                    }))
                }),
            )
            .route(
                "/api/config",
                get(|| async { Json(json!({"trading": {"paper_mode": false}, "strategy": "sure_thing"})) }),
            )
            .route(
                "/api/opportunities",
                get(|| async {
                    Json(json!([
                        {"id": "opp_1", "title": "Rain in NYC", "status": "recommended", "strategy": "edge",
                         "yes_price": 0.517, "no_price": 0.49, "action": "BUY YES", "market_ticker": "KX-A",
                         "discovered_at": "2026-10-16T08:00:00Z", "close_time": "2030-01-01T00:00:00Z"},
                        {"id": "opp_2", "title": "Snow in LA", "status": "pending", "strategy": "sure_thing",
                         "yes_price": 0.03, "no_price": 0.98, "market_ticker": "KX-B",
                         "discovered_at": "", "close_time": ""}
                    ]))
                }),
            )
            .route("/api/opportunities/:id", get(detail))
            .route(
                "/api/agents",
                get(|| async {
                    Json(json!({
                        "agents": [
                            {"name": "scout", "display_name": "Scout", "status": "idle", "description": "Finds markets",
                             "last_run": "2026-10-16T08:00:00Z", "schedule_interval_minutes": 30},
                            {"name": "trader", "display_name": "Trader", "status": "running", "description": "Places orders"}
                        ],
                        "paper_mode": false,
                        "strategy": "sure_thing"
                    }))
                }),
            )
            .route(
                "/api/agents/activity",
                get(|| async {
                    Json(json!([
                        {"agent": "scout", "action": "scan_complete", "market_ticker": "KX-A", "timestamp": "2026-10-16T08:00:00Z"},
                        {"agent": "trader", "action": "order_placed", "market_ticker": "KX-A", "timestamp": "2026-10-16T08:30:00Z"}
                    ]))
                }),
            )
            .route(
                "/api/kalshi/balance",
                get(|| async { Json(json!({"balance_usd": 25.5, "payout_usd": 0.0, "balance_cents": 2550})) }),
            )
            .route(
                "/api/kalshi/positions",
                get(|| async {
                    Json(json!([{"market_ticker": "KX-A", "side": "yes", "contracts": 10, "realized_pnl": 125}]))
                }),
            )
            .route(
                "/api/kalshi/orders",
                get(|| async {
                    Json(json!([{"order_id": "o1", "ticker": "KX-A", "side": "yes", "action": "buy",
                                 "status": "executed", "yes_price": 52, "no_price": 0}]))
                }),
            )
            .route("/api/pipeline/status", get(|| async { Json(json!({"running": false})) }))
            .route("/api/pipeline/run", post(run))
            .with_state(Arc::new(AtomicBool::new(false)))
    }

    async fn detail(Path(id): Path<String>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if id != "opp_1" {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({"detail": format!("Opportunity {id} not found")})),
            ));
        }
        Ok(Json(json!({
            "summary": {"id": "opp_1", "title": "Rain in NYC", "status": "recommended",
                        "yes_price": 0.517, "no_price": 0.49, "action": "BUY YES"},
            "markdown_body": "## Research\nLikely."
        })))
    }

    async fn run(State(running): State<Arc<AtomicBool>>) -> (StatusCode, Json<Value>) {
        if running.swap(true, Ordering::SeqCst) {
            (StatusCode::CONFLICT, Json(json!({"detail": "Pipeline already running"})))
        } else {
            (StatusCode::OK, Json(json!({"status": "started"})))
        }
    }

    pub fn config(base: String) -> Config {
        Config {
            api_base: base,
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock;
    use crate::money::Cents;
    use crate::types::Tone;

    #[tokio::test]
    async fn test_panels_after_first_load() {
        let base = mock::serve(fixtures::backend()).await;
        let dash = Dashboard::new(fixtures::config(base)).unwrap();
        assert!(dash.portfolio().loading);
        assert!(dash.wait_until_loaded(Duration::from_secs(5)).await);

        let portfolio = dash.portfolio();
        assert!(!portfolio.loading);
        assert!(portfolio.error.is_none());
        let totals = portfolio.data.unwrap();
        assert_eq!(totals.realized_pnl, Cents(600));
        assert_eq!(totals.open_count, 2);

        let header = dash.header().data.unwrap();
        assert_eq!(header.mode, "LIVE");
        assert_eq!(header.strategy, "sure_thing");

        let feed = dash.opportunities(None).data.unwrap();
        assert_eq!(feed.cards.len(), 2);
        assert_eq!(feed.cards[0].yes_percent, 52);
        assert_eq!(feed.cards[1].action, None);
        assert_eq!(feed.cards[1].close_time, None);

        let agents = dash.agents().data.unwrap();
        assert_eq!(agents.agents.len(), 2);
        assert_eq!(agents.activity[0].label, "Order Placed");

        let account = dash.account().data.unwrap();
        assert_eq!(account.balance, Some(Cents(2550)));
        assert_eq!(account.orders[0].status_tone, Tone::Positive);

        let control = dash.pipeline().data.unwrap();
        assert!(control.enabled);
    }

    #[tokio::test]
    async fn test_select_and_run() {
        let base = mock::serve(fixtures::backend()).await;
        let dash = Dashboard::new(fixtures::config(base)).unwrap();
        dash.wait_until_loaded(Duration::from_secs(5)).await;

        assert_eq!(dash.detail().data, Some(DetailView::NothingSelected));
        assert!(dash.select(Some("opp_1".into())));
        let mut updates = dash.cache().updates();
        while !matches!(dash.detail().data, Some(DetailView::Ready(_))) {
            updates.changed().await.unwrap();
        }
        let feed = dash.opportunities(None).data.unwrap();
        assert!(feed.cards[0].selected);

        assert_eq!(dash.run_pipeline().await, Ok(()));
        assert_eq!(dash.run_pipeline().await, Err(TriggerError::AlreadyRunning));
        assert_eq!(dash.pipeline().data.unwrap().error.as_deref(), Some("Already running"));
        dash.dismiss_pipeline_error();
        assert_eq!(dash.pipeline().data.unwrap().error, None);

        assert!(dash.select(None));
        assert_eq!(dash.detail().data, Some(DetailView::NothingSelected));
    }

    #[tokio::test]
    async fn test_header_surfaces_agents_error() {
        use axum::routing::get;
        use axum::{Json, Router};
        use serde_json::json;

        let backend = Router::new().route(
            "/api/config",
            get(|| async { Json(json!({"trading": {"paper_mode": true}, "strategy": "edge"})) }),
        );
        let base = mock::serve(backend).await;
        let dash = Dashboard::new(fixtures::config(base)).unwrap();
        assert!(dash.wait_until_loaded(Duration::from_secs(5)).await);

        let header = dash.header();
        assert!(!header.loading);
        assert!(header.fetched_at.is_some());
        assert!(header.error.as_deref().map_or(false, |e| e.contains("/api/agents")));
        assert_eq!(header.data.unwrap().mode, "PAPER");
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dash = Dashboard::new(fixtures::config(format!("http://{addr}"))).unwrap();
        assert!(dash.wait_until_loaded(Duration::from_secs(5)).await);

        let portfolio = dash.portfolio();
        assert!(portfolio.error.is_some());
        assert_eq!(portfolio.data, Some(PortfolioTotals::default()));
        assert!(dash.opportunities(None).data.is_none());
        assert!(dash.account().error.is_some());
        assert_eq!(dash.refresh_all(), 9);
    }
}
