//! Opportunity lifecycle: status ordering, display derivations, the feed and
//! the selected detail.
//!
//! The backend owns every transition. Nothing here mutates a summary; expiry is
//! a display derivation from `close_time`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::cache::{PollOptions, PollingCache, Snapshot, Subscription};
use crate::client::ResourceClient;
use crate::money;
use crate::resource::ResourceKey;
use crate::types::{OpportunityDetail, OpportunityStatus, OpportunitySummary, Tone};

impl OpportunityStatus {
    /// Position along pending → researched → recommended → outcome.
    pub fn rank(self) -> u8 {
        match self {
            OpportunityStatus::Pending | OpportunityStatus::Unknown => 0,
            OpportunityStatus::Researched => 1,
            OpportunityStatus::Recommended => 2,
            OpportunityStatus::Traded | OpportunityStatus::Rejected | OpportunityStatus::Expired => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OpportunityStatus::Traded | OpportunityStatus::Rejected | OpportunityStatus::Expired
        )
    }

    /// Whether the backend may move an item from `self` to `next`.
    pub fn can_transition_to(self, next: OpportunityStatus) -> bool {
        use OpportunityStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Expired) => true,
            (Pending | Unknown, Researched) => true,
            (Researched, Recommended) => true,
            (Recommended, Traded | Rejected) => true,
            _ => false,
        }
    }

    /// A recommendation exists only once research has produced one.
    pub fn carries_action(self) -> bool {
        matches!(
            self,
            OpportunityStatus::Recommended
                | OpportunityStatus::Traded
                | OpportunityStatus::Rejected
                | OpportunityStatus::Expired
        )
    }

    pub fn tone(self) -> Tone {
        match self {
            OpportunityStatus::Pending | OpportunityStatus::Unknown => Tone::Caution,
            OpportunityStatus::Researched => Tone::Info,
            OpportunityStatus::Recommended => Tone::Positive,
            OpportunityStatus::Traded => Tone::Accent,
            OpportunityStatus::Rejected => Tone::Negative,
            OpportunityStatus::Expired => Tone::Muted,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OpportunityStatus::Pending | OpportunityStatus::Unknown => "Pending",
            OpportunityStatus::Researched => "Researched",
            OpportunityStatus::Recommended => "Recommended",
            OpportunityStatus::Traded => "Traded",
            OpportunityStatus::Rejected => "Rejected",
            OpportunityStatus::Expired => "Expired",
        }
    }
}

/// Whole-number percentage of a 0..1 price, half away from zero.
pub fn percent(price: Decimal) -> i64 {
    money::hundredths(price)
}

pub fn strategy_label(strategy: &str) -> String {
    match strategy {
        "edge" => "Edge".to_string(),
        "sure_thing" => "Sure Thing".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeSide {
    Yes,
    No,
    Neutral,
}

impl BadgeSide {
    /// "YES" wins over "NO" when an action mentions both.
    pub fn of(action: &str) -> Self {
        if action.contains("YES") {
            BadgeSide::Yes
        } else if action.contains("NO") {
            BadgeSide::No
        } else {
            BadgeSide::Neutral
        }
    }

    pub fn tone(self) -> Tone {
        match self {
            BadgeSide::Yes => Tone::Positive,
            BadgeSide::No => Tone::Negative,
            BadgeSide::Neutral => Tone::Muted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionBadge {
    pub text: String,
    pub side: BadgeSide,
    pub tone: Tone,
}

impl OpportunitySummary {
    pub fn yes_percent(&self) -> i64 {
        percent(self.yes_price)
    }

    pub fn no_percent(&self) -> i64 {
        percent(self.no_price)
    }

    /// Status to display at `now`: a non-terminal item past its close time shows
    /// as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> OpportunityStatus {
        match self.close_time {
            Some(close) if close <= now && !self.status.is_terminal() => OpportunityStatus::Expired,
            _ => self.status,
        }
    }

    pub fn action_badge(&self) -> Option<ActionBadge> {
        if !self.status.carries_action() {
            return None;
        }
        let text = self.action.as_deref()?;
        let side = BadgeSide::of(text);
        Some(ActionBadge {
            text: text.to_string(),
            side,
            tone: side.tone(),
        })
    }
}

/// One row of the opportunity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityCard {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub status: OpportunityStatus,
    pub status_label: &'static str,
    pub tone: Tone,
    pub strategy: String,
    pub yes_percent: i64,
    pub no_percent: i64,
    pub action: Option<ActionBadge>,
    pub market_ticker: String,
    pub discovered_at: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub selected: bool,
}

impl OpportunityCard {
    pub fn new(opp: &OpportunitySummary, selected: bool, now: DateTime<Utc>) -> Self {
        let status = opp.effective_status(now);
        Self {
            id: opp.id.clone(),
            title: opp.title.clone(),
            subtitle: opp.subtitle.clone(),
            status,
            status_label: status.label(),
            tone: status.tone(),
            strategy: strategy_label(&opp.strategy),
            yes_percent: opp.yes_percent(),
            no_percent: opp.no_percent(),
            action: opp.action_badge(),
            market_ticker: opp.market_ticker.clone(),
            discovered_at: opp.discovered_at,
            close_time: opp.close_time,
            selected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedView {
    pub cards: Vec<OpportunityCard>,
    /// Items in the feed before filtering.
    pub total: usize,
}

/// Cards in backend order, optionally restricted to one displayed status.
pub fn feed_view(
    opportunities: &[OpportunitySummary],
    selected: Option<&str>,
    filter: Option<OpportunityStatus>,
    now: DateTime<Utc>,
) -> FeedView {
    let cards = opportunities
        .iter()
        .filter(|o| filter.map_or(true, |f| o.effective_status(now) == f))
        .map(|o| OpportunityCard::new(o, selected == Some(o.id.as_str()), now))
        .collect();
    FeedView {
        cards,
        total: opportunities.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailCard {
    #[serde(flatten)]
    pub card: OpportunityCard,
    pub event_ticker: String,
    pub estimated_true_probability: Option<Decimal>,
    pub edge: Option<Decimal>,
    pub expected_value: Option<Decimal>,
    /// Passed through unrendered.
    pub markdown_body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DetailView {
    NothingSelected,
    Loading { id: String },
    NotFound { id: String },
    Failed { id: String, message: String },
    Ready(Box<DetailCard>),
}

pub fn detail_view(
    selected: Option<&str>,
    snapshot: &Snapshot<OpportunityDetail>,
    now: DateTime<Utc>,
) -> DetailView {
    let Some(id) = selected else {
        return DetailView::NothingSelected;
    };
    if let Some(detail) = &snapshot.data {
        let summary = &detail.summary;
        return DetailView::Ready(Box::new(DetailCard {
            card: OpportunityCard::new(summary, true, now),
            event_ticker: summary.event_ticker.clone(),
            estimated_true_probability: summary.estimated_true_probability,
            edge: summary.edge,
            expected_value: summary.expected_value,
            markdown_body: detail.markdown_body.clone(),
        }));
    }
    let id = id.to_string();
    match &snapshot.error {
        Some(e) if e.is_not_found() => DetailView::NotFound { id },
        Some(e) => DetailView::Failed {
            id,
            message: e.to_string(),
        },
        None => DetailView::Loading { id },
    }
}

/// The one opportunity whose detail is being watched.
pub struct OpportunitySelection {
    cache: PollingCache,
    client: ResourceClient,
    interval: Duration,
    selected: Option<String>,
    detail: Option<Subscription<OpportunityDetail>>,
}

impl OpportunitySelection {
    pub fn new(cache: PollingCache, client: ResourceClient, interval: Duration) -> Self {
        Self {
            cache,
            client,
            interval,
            selected: None,
            detail: None,
        }
    }

    /// Point the selection at `id`, or clear it with `None`. Returns false when
    /// nothing changed.
    pub fn select(&mut self, id: Option<String>) -> bool {
        let id = id.filter(|s| !s.is_empty());
        if id == self.selected {
            return false;
        }
        // Subscribe before releasing the old key so a reselect keeps its entry warm.
        let next = id.as_ref().map(|id| {
            let key = ResourceKey::Opportunity(id.clone());
            let fetch = self.client.getter::<OpportunityDetail>(key.path());
            self.cache
                .subscribe(Some(key), fetch, PollOptions::every(self.interval))
        });
        debug!(
            "Selection {} -> {}",
            self.selected.as_deref().unwrap_or("none"),
            id.as_deref().unwrap_or("none")
        );
        self.detail = next;
        self.selected = id;
        true
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn snapshot(&self) -> Snapshot<OpportunityDetail> {
        self.detail
            .as_ref()
            .map_or_else(Snapshot::empty, Subscription::snapshot)
    }

    pub fn refresh(&self) {
        if let Some(sub) = &self.detail {
            sub.refresh();
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> DetailView {
        detail_view(self.selected(), &self.snapshot(), now)
    }
}
