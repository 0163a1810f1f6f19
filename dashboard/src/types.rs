use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::money::Cents;

/// Colour family a view should use for a badge or figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Positive,
    Negative,
    Caution,
    Info,
    Accent,
    Muted,
}

// ── Opportunities ──

/// Lifecycle of a discovered opportunity, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Pending,
    #[serde(alias = "researching")]
    Researched,
    Recommended,
    Traded,
    #[serde(alias = "skipped")]
    Rejected,
    Expired,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpportunityStatus::Pending => "pending",
            OpportunityStatus::Researched => "researched",
            OpportunityStatus::Recommended => "recommended",
            OpportunityStatus::Traded => "traded",
            OpportunityStatus::Rejected => "rejected",
            OpportunityStatus::Expired => "expired",
            OpportunityStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

fn default_status() -> OpportunityStatus {
    OpportunityStatus::Pending
}

fn default_strategy() -> String {
    "edge".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitySummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub subtitle: Option<String>,
    #[serde(default = "default_status")]
    pub status: OpportunityStatus,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub yes_price: Decimal,
    #[serde(default)]
    pub no_price: Decimal,
    #[serde(default, deserialize_with = "non_empty")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub discovered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub market_ticker: String,
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_true_probability: Option<Decimal>,
    #[serde(default)]
    pub edge: Option<Decimal>,
    #[serde(default)]
    pub expected_value: Option<Decimal>,
    #[serde(default)]
    pub date_folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityDetail {
    pub summary: OpportunitySummary,
    #[serde(default)]
    pub markdown_body: String,
    #[serde(default)]
    pub raw_frontmatter: Option<serde_json::Value>,
}

// ── Portfolio ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    #[serde(default)]
    pub total_value: Decimal,
    #[serde(default)]
    pub cash_balance: Decimal,
    #[serde(default)]
    pub positions_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub starting_value: Decimal,
    #[serde(default)]
    pub current_pnl: Decimal,
    #[serde(default)]
    pub current_pnl_pct: Decimal,
    #[serde(default)]
    pub trades_today: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    #[serde(default)]
    pub daily_loss_limit_hit: bool,
    #[serde(default)]
    pub trading_halted: bool,
    #[serde(default)]
    pub capital_at_risk_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "YES", alias = "yes")]
    Yes,
    #[serde(rename = "NO", alias = "no")]
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_ticker: String,
    pub side: Side,
    pub contracts: u32,
    pub average_entry: Decimal,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub unrealized_pnl: Option<Decimal>,
}

/// A settled or exited position. Only `pnl` is guaranteed by every backend variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub market_ticker: String,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub contracts: u32,
    #[serde(default)]
    pub average_entry: Option<Decimal>,
    pub pnl: Decimal,
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub portfolio: PortfolioStats,
    #[serde(default)]
    pub daily_stats: Option<DailyStats>,
    #[serde(default)]
    pub open_positions: Vec<Position>,
    #[serde(default)]
    pub closed_positions: Vec<ClosedPosition>,
    #[serde(default)]
    pub risk_status: Option<RiskStatus>,
}

// ── Agents ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunStatus {
    Idle,
    Running,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRunStatus::Idle => "idle",
            AgentRunStatus::Running => "running",
            AgentRunStatus::Error => "error",
            AgentRunStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_agent_status")]
    pub status: AgentRunStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schedule_interval_minutes: Option<u32>,
}

fn default_agent_status() -> AgentRunStatus {
    AgentRunStatus::Idle
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusResponse {
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
    #[serde(default)]
    pub paper_mode: bool,
    #[serde(default)]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub agent: String,
    pub action: String,
    #[serde(default)]
    pub market_ticker: String,
    #[serde(default, deserialize_with = "timestamp::lenient")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub running: bool,
}

// ── Config ──

fn default_paper_mode() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_paper_mode")]
    pub paper_mode: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            paper_mode: true,
            extra: serde_json::Map::new(),
        }
    }
}

/// Contents of the backend's config.yaml. An absent file is served as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColiseumConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Kalshi account ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalshiBalance {
    pub balance_usd: Decimal,
    #[serde(default)]
    pub payout_usd: Decimal,
    pub balance_cents: i64,
}

impl KalshiBalance {
    pub fn balance(&self) -> Cents {
        Cents(self.balance_cents)
    }

    pub fn payout(&self) -> Cents {
        Cents::from_usd(self.payout_usd)
    }

    /// `balance_usd` and `balance_cents` describe the same amount; true when they
    /// agree after rounding dollars to cents.
    pub fn is_consistent(&self) -> bool {
        Cents::from_usd(self.balance_usd) == self.balance()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalshiPosition {
    pub market_ticker: String,
    #[serde(default)]
    pub event_ticker: String,
    /// "yes", "no", or absent when flat.
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub contracts: i64,
    /// Cents.
    #[serde(default)]
    pub realized_pnl: i64,
    #[serde(default)]
    pub resting_orders_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalshiOrder {
    pub order_id: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub status: String,
    /// Cents.
    #[serde(default)]
    pub yes_price: i64,
    /// Cents.
    #[serde(default)]
    pub no_price: i64,
    #[serde(default)]
    pub remaining_count: i64,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

/// The dashboard server stringifies datetimes with `str()`, so we see RFC 3339,
/// `YYYY-MM-DD HH:MM:SS[+offset]`, empty strings and the literal `None`.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() || s == "None" || s == "null" {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"] {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}
