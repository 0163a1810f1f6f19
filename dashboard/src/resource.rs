use std::fmt;

pub const PIPELINE_RUN_PATH: &str = "/api/pipeline/run";

/// Endpoint family. Refresh cadence is configured per kind, so every
/// `opportunity:{id}` key shares one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    PortfolioState,
    Config,
    Opportunities,
    OpportunityDetail,
    AgentStatus,
    AgentActivity,
    KalshiBalance,
    KalshiPositions,
    KalshiOrders,
    PipelineStatus,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::PortfolioState,
        ResourceKind::Config,
        ResourceKind::Opportunities,
        ResourceKind::OpportunityDetail,
        ResourceKind::AgentStatus,
        ResourceKind::AgentActivity,
        ResourceKind::KalshiBalance,
        ResourceKind::KalshiPositions,
        ResourceKind::KalshiOrders,
        ResourceKind::PipelineStatus,
    ];

    /// Suffix of the `REFRESH_<SUFFIX>_MS` override.
    pub fn env_suffix(self) -> &'static str {
        match self {
            ResourceKind::PortfolioState => "PORTFOLIO",
            ResourceKind::Config => "CONFIG",
            ResourceKind::Opportunities => "OPPORTUNITIES",
            ResourceKind::OpportunityDetail => "OPPORTUNITY_DETAIL",
            ResourceKind::AgentStatus => "AGENTS",
            ResourceKind::AgentActivity => "ACTIVITY",
            ResourceKind::KalshiBalance => "KALSHI_BALANCE",
            ResourceKind::KalshiPositions => "KALSHI_POSITIONS",
            ResourceKind::KalshiOrders => "KALSHI_ORDERS",
            ResourceKind::PipelineStatus => "PIPELINE_STATUS",
        }
    }

    /// Default refresh interval in milliseconds.
    pub fn default_interval_ms(self) -> u64 {
        match self {
            ResourceKind::AgentStatus | ResourceKind::PipelineStatus => 10_000,
            ResourceKind::PortfolioState
            | ResourceKind::AgentActivity
            | ResourceKind::KalshiPositions
            | ResourceKind::KalshiOrders => 15_000,
            ResourceKind::Opportunities
            | ResourceKind::OpportunityDetail
            | ResourceKind::KalshiBalance => 30_000,
            ResourceKind::Config => 60_000,
        }
    }
}

/// Identity of one pollable backend document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    PortfolioState,
    Config,
    Opportunities,
    Opportunity(String),
    AgentStatus,
    AgentActivity,
    KalshiBalance,
    KalshiPositions,
    KalshiOrders,
    PipelineStatus,
}

impl ResourceKey {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceKey::PortfolioState => ResourceKind::PortfolioState,
            ResourceKey::Config => ResourceKind::Config,
            ResourceKey::Opportunities => ResourceKind::Opportunities,
            ResourceKey::Opportunity(_) => ResourceKind::OpportunityDetail,
            ResourceKey::AgentStatus => ResourceKind::AgentStatus,
            ResourceKey::AgentActivity => ResourceKind::AgentActivity,
            ResourceKey::KalshiBalance => ResourceKind::KalshiBalance,
            ResourceKey::KalshiPositions => ResourceKind::KalshiPositions,
            ResourceKey::KalshiOrders => ResourceKind::KalshiOrders,
            ResourceKey::PipelineStatus => ResourceKind::PipelineStatus,
        }
    }

    /// Backend path. `PortfolioState` has two historical paths; this returns the
    /// first, the client walks the rest (see `Config::portfolio_paths`).
    pub fn path(&self) -> String {
        match self {
            ResourceKey::PortfolioState => "/api/status".to_string(),
            ResourceKey::Config => "/api/config".to_string(),
            ResourceKey::Opportunities => "/api/opportunities".to_string(),
            ResourceKey::Opportunity(id) => format!("/api/opportunities/{}", urlencoding::encode(id)),
            ResourceKey::AgentStatus => "/api/agents".to_string(),
            ResourceKey::AgentActivity => "/api/agents/activity".to_string(),
            ResourceKey::KalshiBalance => "/api/kalshi/balance".to_string(),
            ResourceKey::KalshiPositions => "/api/kalshi/positions".to_string(),
            ResourceKey::KalshiOrders => "/api/kalshi/orders".to_string(),
            ResourceKey::PipelineStatus => "/api/pipeline/status".to_string(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::PortfolioState => write!(f, "portfolio-state"),
            ResourceKey::Config => write!(f, "config"),
            ResourceKey::Opportunities => write!(f, "opportunities"),
            ResourceKey::Opportunity(id) => write!(f, "opportunity:{id}"),
            ResourceKey::AgentStatus => write!(f, "agent-status"),
            ResourceKey::AgentActivity => write!(f, "agent-activity"),
            ResourceKey::KalshiBalance => write!(f, "kalshi-balance"),
            ResourceKey::KalshiPositions => write!(f, "kalshi-positions"),
            ResourceKey::KalshiOrders => write!(f, "kalshi-orders"),
            ResourceKey::PipelineStatus => write!(f, "pipeline-status"),
        }
    }
}
