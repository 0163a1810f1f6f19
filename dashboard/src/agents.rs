use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;

use crate::types::{
    ActivityItem, AgentDescriptor, AgentRunStatus, AgentStatusResponse, ColiseumConfig, Tone,
};

/// Pipeline stage an agent name maps to. Unknown names get the generic look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scout,
    Researcher,
    Recommender,
    Trader,
    Guardian,
    Other,
}

impl Stage {
    pub fn from_name(name: &str) -> Self {
        match name {
            "scout" => Stage::Scout,
            "analyst_researcher" | "researcher" => Stage::Researcher,
            "analyst_recommender" | "recommender" => Stage::Recommender,
            "trader" => Stage::Trader,
            "guardian" => Stage::Guardian,
            _ => Stage::Other,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Stage::Scout => "search",
            Stage::Researcher => "microscope",
            Stage::Recommender => "calculator",
            Stage::Trader => "shopping-cart",
            Stage::Guardian => "shield",
            Stage::Other => "circle",
        }
    }

    pub fn accent(self) -> &'static str {
        match self {
            Stage::Scout => "sky",
            Stage::Researcher => "amber",
            Stage::Recommender => "emerald",
            Stage::Trader => "violet",
            Stage::Guardian => "rose",
            Stage::Other => "muted",
        }
    }
}

impl AgentRunStatus {
    pub fn tone(self) -> Tone {
        match self {
            AgentRunStatus::Running => Tone::Caution,
            AgentRunStatus::Error => Tone::Negative,
            AgentRunStatus::Idle | AgentRunStatus::Unknown => Tone::Muted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentCard {
    pub name: String,
    pub display_name: String,
    pub stage: Stage,
    pub icon: &'static str,
    pub accent: &'static str,
    pub status: AgentRunStatus,
    pub status_tone: Tone,
    pub description: String,
    pub last_run: Option<DateTime<Utc>>,
    pub schedule: Option<String>,
    /// Draw a connector to the next stage.
    pub has_next: bool,
}

/// Cards in backend order, which is pipeline order.
pub fn agent_pipeline_view(agents: &[AgentDescriptor]) -> Vec<AgentCard> {
    let last = agents.len().saturating_sub(1);
    agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let stage = Stage::from_name(&agent.name);
            AgentCard {
                name: agent.name.clone(),
                display_name: if agent.display_name.is_empty() {
                    agent.name.clone()
                } else {
                    agent.display_name.clone()
                },
                stage,
                icon: stage.icon(),
                accent: stage.accent(),
                status: agent.status,
                status_tone: agent.status.tone(),
                description: agent.description.clone(),
                last_run: agent.last_run,
                schedule: agent
                    .schedule_interval_minutes
                    .filter(|m| *m > 0)
                    .map(|m| format!("Every {m}m")),
                has_next: i < last,
            }
        })
        .collect()
}

/// `scout_scan` → `Scout Scan`. Underscores and hyphens become spaces and the
/// first letter or digit of every word is uppercased.
pub fn activity_label(action: &str) -> String {
    let mut out = String::with_capacity(action.len());
    let mut prev_word = false;
    for c in action.chars() {
        let c = if c == '_' || c == '-' { ' ' } else { c };
        let word = c.is_ascii_alphanumeric();
        out.push(if word && !prev_word { c.to_ascii_uppercase() } else { c });
        prev_word = word;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    pub agent: String,
    pub stage: Stage,
    pub accent: &'static str,
    pub label: String,
    pub market_ticker: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Newest `limit` items, newest first. Items with equal or missing timestamps
/// keep backend order; undated items sort last.
pub fn recent_activity(items: &[ActivityItem], limit: usize) -> Vec<ActivityRow> {
    let mut sorted: Vec<&ActivityItem> = items.iter().collect();
    sorted.sort_by_key(|item| Reverse(item.timestamp));
    sorted
        .into_iter()
        .take(limit)
        .map(|item| {
            let stage = Stage::from_name(&item.agent);
            ActivityRow {
                agent: item.agent.clone(),
                stage,
                accent: stage.accent(),
                label: activity_label(&item.action),
                market_ticker: item.market_ticker.clone(),
                timestamp: item.timestamp,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineHeader {
    pub paper_mode: bool,
    /// "PAPER" or "LIVE".
    pub mode: &'static str,
    pub strategy: String,
}

/// Config wins over the agent-status echo of the same settings; with neither
/// loaded we assume paper mode on the `edge` strategy.
pub fn pipeline_header(
    config: Option<&ColiseumConfig>,
    agents: Option<&AgentStatusResponse>,
) -> PipelineHeader {
    let paper_mode = config
        .map(|c| c.trading.paper_mode)
        .or_else(|| agents.map(|a| a.paper_mode))
        .unwrap_or(true);
    let strategy = config
        .and_then(|c| c.strategy.clone())
        .or_else(|| agents.and_then(|a| a.strategy.clone()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "edge".to_string());
    PipelineHeader {
        paper_mode,
        mode: if paper_mode { "PAPER" } else { "LIVE" },
        strategy,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentsView {
    pub header: PipelineHeader,
    pub agents: Vec<AgentCard>,
    pub activity: Vec<ActivityRow>,
}

pub fn agents_view(
    status: Option<&AgentStatusResponse>,
    activity: Option<&[ActivityItem]>,
    limit: usize,
) -> AgentsView {
    AgentsView {
        header: pipeline_header(None, status),
        agents: status.map_or_else(Vec::new, |s| agent_pipeline_view(&s.agents)),
        activity: activity.map_or_else(Vec::new, |items| recent_activity(items, limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn agent(name: &str, status: AgentRunStatus) -> AgentDescriptor {
        AgentDescriptor {
            name: name.to_string(),
            display_name: String::new(),
            status,
            description: String::new(),
            last_run: None,
            schedule_interval_minutes: None,
        }
    }

    fn item(action: &str, minute: Option<u32>) -> ActivityItem {
        ActivityItem {
            agent: "scout".to_string(),
            action: action.to_string(),
            market_ticker: "KX-A".to_string(),
            timestamp: minute.map(|m| Utc.with_ymd_and_hms(2026, 10, 16, 9, m, 0).unwrap()),
        }
    }

    #[test]
    fn test_activity_label() {
        assert_eq!(activity_label("scout_scan_complete"), "Scout Scan Complete");
        assert_eq!(activity_label("trade-executed"), "Trade Executed");
        assert_eq!(activity_label("already Fine"), "Already Fine");
        assert_eq!(activity_label("2nd_pass"), "2nd Pass");
        assert_eq!(activity_label(""), "");
    }

    #[test]
    fn test_pipeline_keeps_backend_order() {
        let agents = vec![
            agent("guardian", AgentRunStatus::Idle),
            agent("scout", AgentRunStatus::Running),
            agent("oracle", AgentRunStatus::Error),
        ];
        let cards = agent_pipeline_view(&agents);
        let names: Vec<_> = cards.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["guardian", "scout", "oracle"]);

        assert_eq!(cards[1].status_tone, Tone::Caution);
        assert_eq!(cards[2].stage, Stage::Other);
        assert_eq!(cards[2].icon, "circle");
        assert_eq!(cards[2].display_name, "oracle");
        assert!(cards[1].has_next);
        assert!(!cards[2].has_next);
    }

    #[test]
    fn test_schedule_label() {
        let mut scout = agent("scout", AgentRunStatus::Idle);
        scout.schedule_interval_minutes = Some(30);
        assert_eq!(agent_pipeline_view(&[scout])[0].schedule.as_deref(), Some("Every 30m"));
    }

    #[test]
    fn test_recent_activity_newest_first_and_limited() {
        let items = vec![
            item("a", Some(1)),
            item("b", Some(5)),
            item("c", None),
            item("d", Some(5)),
            item("e", Some(3)),
        ];
        let rows = recent_activity(&items, 4);
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["B", "D", "E", "A"]);
        assert_eq!(rows[0].stage, Stage::Scout);
    }

    #[test]
    fn test_header_defaults() {
        let header = pipeline_header(None, None);
        assert!(header.paper_mode);
        assert_eq!(header.mode, "PAPER");
        assert_eq!(header.strategy, "edge");

        let config: ColiseumConfig =
            serde_json::from_str(r#"{"trading": {"paper_mode": false}, "strategy": "sure_thing"}"#)
                .unwrap();
        let status = AgentStatusResponse {
            agents: vec![],
            paper_mode: true,
            strategy: Some("edge".into()),
        };
        let header = pipeline_header(Some(&config), Some(&status));
        assert_eq!(header.mode, "LIVE");
        assert_eq!(header.strategy, "sure_thing");

        let header = pipeline_header(None, Some(&status));
        assert!(header.paper_mode);
    }
}
