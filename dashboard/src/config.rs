use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

use crate::resource::{ResourceKey, ResourceKind};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub portfolio_paths: Vec<String>, // tried in order, next one only on 404
    pub request_timeout_secs: u64,
    pub retry_limit: u32,       // consecutive failures before an entry is marked failing
    pub dedupe_window_ms: u64,  // mount revalidations inside this window are skipped
    pub activity_limit: usize,  // recent activity rows shown
    pub listen_port: u16,
    pub refresh: RefreshPlan,
}

/// Per-resource refresh cadence.
#[derive(Debug, Clone)]
pub struct RefreshPlan {
    intervals: HashMap<ResourceKind, Duration>,
}

impl Default for RefreshPlan {
    fn default() -> Self {
        Self {
            intervals: ResourceKind::ALL
                .iter()
                .map(|k| (*k, Duration::from_millis(k.default_interval_ms())))
                .collect(),
        }
    }
}

impl RefreshPlan {
    pub fn interval(&self, key: &ResourceKey) -> Duration {
        self.interval_for(key.kind())
    }

    pub fn interval_for(&self, kind: ResourceKind) -> Duration {
        self.intervals
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Duration::from_millis(kind.default_interval_ms()))
    }

    pub fn set(&mut self, kind: ResourceKind, interval: Duration) {
        self.intervals.insert(kind, interval);
    }

    fn from_env() -> Result<Self> {
        let mut plan = Self::default();
        for kind in ResourceKind::ALL {
            let key = format!("REFRESH_{}_MS", kind.env_suffix());
            if let Ok(raw) = std::env::var(&key) {
                let ms: u64 = raw
                    .parse()
                    .with_context(|| format!("Invalid interval for {key}: {raw}"))?;
                if ms == 0 {
                    anyhow::bail!("{key} must be greater than zero");
                }
                plan.set(kind, Duration::from_millis(ms));
            }
        }
        Ok(plan)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            portfolio_paths: vec!["/api/status".to_string(), "/api/state".to_string()],
            request_timeout_secs: 15,
            retry_limit: 3,
            dedupe_window_ms: 2000,
            activity_limit: 10,
            listen_port: 3001,
            refresh: RefreshPlan::default(),
        }
    }
}

impl Config {
    /// Load config from a specific .env file, or the default `.env` if None.
    pub fn from_env_file(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                dotenvy::from_filename(p).with_context(|| format!("Reading config file {p}"))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::build_from_env()
    }

    fn build_from_env() -> Result<Self> {
        let portfolio_paths: Vec<String> = env("PORTFOLIO_PATHS", "/api/status,/api/state")
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if portfolio_paths.is_empty() {
            anyhow::bail!("PORTFOLIO_PATHS must name at least one path");
        }

        Ok(Self {
            api_base: env("COLISEUM_API", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            portfolio_paths,
            request_timeout_secs: env("REQUEST_TIMEOUT_SECS", "15").parse().unwrap_or(15),
            retry_limit: env("RETRY_LIMIT", "3").parse().unwrap_or(3),
            dedupe_window_ms: env("DEDUPE_WINDOW_MS", "2000").parse().unwrap_or(2000),
            activity_limit: env("ACTIVITY_LIMIT", "10").parse().unwrap_or(10),
            listen_port: env("LISTEN_PORT", "3001")
                .parse()
                .context("LISTEN_PORT must be a valid u16")?,
            refresh: RefreshPlan::from_env()?,
        })
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadence() {
        let plan = RefreshPlan::default();
        assert_eq!(plan.interval(&ResourceKey::AgentStatus), Duration::from_secs(10));
        assert_eq!(plan.interval(&ResourceKey::PortfolioState), Duration::from_secs(15));
        assert_eq!(
            plan.interval(&ResourceKey::Opportunity("x".into())),
            Duration::from_secs(30)
        );
        assert!(plan.interval(&ResourceKey::Config) > plan.interval(&ResourceKey::KalshiPositions));
    }

    #[test]
    fn test_override() {
        let mut plan = RefreshPlan::default();
        plan.set(ResourceKind::OpportunityDetail, Duration::from_secs(5));
        assert_eq!(
            plan.interval(&ResourceKey::Opportunity("y".into())),
            Duration::from_secs(5)
        );
    }
}
