//! Revalidation triggers.
//!
//! Every source (interval timers, window focus, connectivity, manual refresh)
//! produces a [`Trigger`] and hands it to a [`TriggerSink`]. The cache drains the
//! sink from one dispatch loop and routes each trigger into its single
//! revalidation entry point. Only [`IntervalTimer`] knows about tokio timers.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::resource::ResourceKey;

/// Shortest refresh period a timer runs at; shorter requests are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The key's refresh interval elapsed.
    Interval(ResourceKey),
    /// The view regained focus: revalidate every active key.
    Focus,
    /// Connectivity came back: revalidate every active key.
    Reconnect,
    /// Explicit `refresh()` of one key.
    Manual(ResourceKey),
    /// A new subscriber mounted on the key.
    Mount(ResourceKey),
}

impl Trigger {
    /// Key this trigger targets, `None` for broadcast triggers.
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            Trigger::Interval(k) | Trigger::Manual(k) | Trigger::Mount(k) => Some(k),
            Trigger::Focus | Trigger::Reconnect => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval(k) => write!(f, "interval({k})"),
            Trigger::Focus => write!(f, "focus"),
            Trigger::Reconnect => write!(f, "reconnect"),
            Trigger::Manual(k) => write!(f, "manual({k})"),
            Trigger::Mount(k) => write!(f, "mount({k})"),
        }
    }
}

/// Cloneable handle trigger sources push into.
#[derive(Debug, Clone)]
pub struct TriggerSink {
    tx: mpsc::UnboundedSender<Trigger>,
}

pub fn channel() -> (TriggerSink, mpsc::UnboundedReceiver<Trigger>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TriggerSink { tx }, rx)
}

impl TriggerSink {
    /// Returns false once the dispatcher has gone away.
    pub fn fire(&self, trigger: Trigger) -> bool {
        self.tx.send(trigger).is_ok()
    }

    pub fn focus(&self) -> bool {
        self.fire(Trigger::Focus)
    }

    pub fn reconnect(&self) -> bool {
        self.fire(Trigger::Reconnect)
    }

    pub fn refresh(&self, key: ResourceKey) -> bool {
        self.fire(Trigger::Manual(key))
    }
}

/// Fires `Trigger::Interval(key)` every `period` (at least [`MIN_PERIOD`]) until dropped.
#[derive(Debug)]
pub struct IntervalTimer {
    handle: JoinHandle<()>,
}

impl IntervalTimer {
    pub fn start(sink: TriggerSink, key: ResourceKey, period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !sink.fire(Trigger::Interval(key.clone())) {
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_timer_fires_until_dropped() {
        let (sink, mut rx) = channel();
        let timer = IntervalTimer::start(sink, ResourceKey::AgentStatus, Duration::from_secs(10));

        let first = rx.recv().await.unwrap();
        assert_eq!(first, Trigger::Interval(ResourceKey::AgentStatus));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.key(), Some(&ResourceKey::AgentStatus));

        drop(timer);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_raised_to_minimum() {
        let (sink, mut rx) = channel();
        let started = Instant::now();
        let _timer = IntervalTimer::start(sink, ResourceKey::Config, Duration::ZERO);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(started.elapsed() >= MIN_PERIOD * 2);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_dispatcher() {
        let (sink, rx) = channel();
        assert!(sink.focus());
        drop(rx);
        assert!(!sink.reconnect());
    }
}
