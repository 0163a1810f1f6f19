//! Stale-while-revalidate cache keyed by [`ResourceKey`].
//!
//! One [`Entry`] per key, written only by the cache. Invariants:
//! - at most one fetch in flight per key; triggers arriving meanwhile are coalesced;
//! - every fetch carries a sequence number and the epoch it was issued in; a
//!   response older than the applied one, or issued before the last teardown, is
//!   dropped;
//! - a failed fetch keeps the previous value and records the error;
//! - a key past its retry ceiling keeps polling, backing off up to
//!   `MAX_BACKOFF_FACTOR` times its interval.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::resource::ResourceKey;
use crate::scheduler::{self, IntervalTimer, Trigger, TriggerSink};

type Value = Arc<dyn Any + Send + Sync>;
const MAX_BACKOFF_FACTOR: u32 = 8;

type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, FetchError>> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub refresh_interval: Duration,
}

impl PollOptions {
    /// Intervals below [`scheduler::MIN_PERIOD`] are raised to it.
    pub fn every(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval: refresh_interval.max(scheduler::MIN_PERIOD),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Consecutive failures after which a key is reported failing and its
    /// interval polling backs off.
    pub retry_limit: u32,
    /// Mount revalidations within this window of the last success are skipped.
    pub dedupe_window: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            dedupe_window: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for CacheSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            retry_limit: cfg.retry_limit.max(1),
            dedupe_window: Duration::from_millis(cfg.dedupe_window_ms),
        }
    }
}

/// What a revalidation request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    /// A fetch with this sequence number was started.
    Issued(u64),
    /// A fetch was already in flight.
    Coalesced,
    /// Mount inside the dedupe window.
    Deduped,
    /// Interval tick skipped while a failing key backs off.
    BackedOff,
    /// Nobody is subscribed to the key.
    Inactive,
}

/// Point-in-time view of one entry, typed for the subscriber.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub data: Option<Arc<T>>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running, with or without data.
    pub is_validating: bool,
    pub error: Option<FetchError>,
    /// Issue time of the fetch whose result is shown.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Retry ceiling reached. Polling goes on with backoff; the next success
    /// clears it.
    pub failing: bool,
}

impl<T> Snapshot<T> {
    pub fn empty() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_validating: false,
            error: None,
            fetched_at: None,
            failing: false,
        }
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            is_validating: self.is_validating,
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            failing: self.failing,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    seq: u64,
    epoch: u64,
    issued_at: DateTime<Utc>,
}

struct InFlight {
    ticket: Ticket,
    abort: AbortHandle,
}

struct Entry {
    value: Option<Value>,
    fetched_at: Option<DateTime<Utc>>,
    applied_at: Option<Instant>,
    attempted_at: Option<Instant>,
    period: Duration,
    error: Option<FetchError>,
    in_flight: Option<InFlight>,
    next_seq: u64,
    applied_seq: u64,
    epoch: u64,
    failures: u32,
    stale: bool,
    subscribers: usize,
    fetcher: Option<Fetcher>,
    timer: Option<IntervalTimer>,
}

impl Entry {
    fn new() -> Self {
        Self {
            value: None,
            fetched_at: None,
            applied_at: None,
            attempted_at: None,
            period: scheduler::MIN_PERIOD,
            error: None,
            in_flight: None,
            next_seq: 0,
            applied_seq: 0,
            epoch: 0,
            failures: 0,
            stale: false,
            subscribers: 0,
            fetcher: None,
            timer: None,
        }
    }

    /// Whether an interval tick may fetch. Past the ceiling the wait doubles
    /// with each further failure, capped at `MAX_BACKOFF_FACTOR` periods.
    fn interval_due(&self, retry_limit: u32) -> bool {
        if self.failures == 0 || self.failures < retry_limit {
            return true;
        }
        let doublings = (self.failures - retry_limit + 1).min(MAX_BACKOFF_FACTOR.ilog2());
        let backoff = self.period.saturating_mul(1 << doublings);
        // Half a period of slack absorbs tick jitter.
        self.attempted_at
            .map_or(true, |t| t.elapsed() + self.period / 2 >= backoff)
    }
}

struct Inner {
    entries: DashMap<ResourceKey, Entry>,
    settings: CacheSettings,
    sink: TriggerSink,
    offline: AtomicBool,
    version: watch::Sender<u64>,
}

/// Shared handle; clones refer to the same entries.
#[derive(Clone)]
pub struct PollingCache {
    inner: Arc<Inner>,
}

impl PollingCache {
    /// Must be called inside a tokio runtime: spawns the trigger dispatcher.
    pub fn new(settings: CacheSettings) -> Self {
        let (sink, mut rx) = scheduler::channel();
        let (version, _) = watch::channel(0u64);
        let inner = Arc::new(Inner {
            entries: DashMap::new(),
            settings,
            sink,
            offline: AtomicBool::new(false),
            version,
        });

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(trigger) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                PollingCache { inner }.dispatch(&trigger);
            }
        });

        Self { inner }
    }

    /// Handle for external trigger sources (focus, connectivity).
    pub fn sink(&self) -> TriggerSink {
        self.inner.sink.clone()
    }

    /// Subscribe to `key`. `None` is an empty subscription: nothing is fetched.
    ///
    /// A cached value is visible in the returned subscription immediately; a
    /// background revalidation is started unless one is already running or the
    /// value is fresher than the dedupe window.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: Option<ResourceKey>,
        fetch: F,
        options: PollOptions,
    ) -> Subscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let updates = self.inner.version.subscribe();
        let Some(key) = key else {
            return Subscription {
                cache: self.clone(),
                key: None,
                updates,
                _marker: PhantomData,
            };
        };

        let fetcher: Fetcher = Arc::new(move || -> BoxFuture<'static, Result<Value, FetchError>> {
            let fut = fetch();
            Box::pin(async move { fut.await.map(|v| Arc::new(v) as Value) })
        });

        {
            let mut entry = self.inner.entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.fetcher = Some(fetcher);
            entry.subscribers += 1;
            if entry.subscribers == 1 {
                entry.period = options.refresh_interval.max(scheduler::MIN_PERIOD);
                entry.timer = Some(IntervalTimer::start(
                    self.inner.sink.clone(),
                    key.clone(),
                    options.refresh_interval,
                ));
                debug!("{key}: first subscriber, polling every {:?}", options.refresh_interval);
            }
        }

        self.revalidate_with(&key, &Trigger::Mount(key.clone()));

        Subscription {
            cache: self.clone(),
            key: Some(key),
            updates,
            _marker: PhantomData,
        }
    }

    pub fn snapshot<T: Send + Sync + 'static>(&self, key: &ResourceKey) -> Snapshot<T> {
        let Some(entry) = self.inner.entries.get(key) else {
            return Snapshot::empty();
        };
        let data = entry.value.clone().and_then(|v| match v.downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                debug!("{key}: cached value has a different type than requested");
                None
            }
        });
        Snapshot {
            is_loading: data.is_none() && entry.in_flight.is_some(),
            is_validating: entry.in_flight.is_some(),
            data,
            error: entry.error.clone(),
            fetched_at: entry.fetched_at,
            failing: entry.failures >= self.inner.settings.retry_limit,
        }
    }

    /// Explicit refresh of one key.
    pub fn revalidate(&self, key: &ResourceKey) -> Revalidation {
        self.revalidate_with(key, &Trigger::Manual(key.clone()))
    }

    /// Force a fresh read. A fetch already in flight may predate the change, so
    /// the entry is marked stale and fetched again once that fetch lands.
    pub fn invalidate(&self, key: &ResourceKey) -> Revalidation {
        if let Some(mut entry) = self.inner.entries.get_mut(key) {
            entry.stale = true;
        }
        self.revalidate(key)
    }

    /// Route one trigger to the revalidation entry point.
    pub fn dispatch(&self, trigger: &Trigger) {
        match trigger.key() {
            Some(key) => {
                self.revalidate_with(key, trigger);
            }
            None => {
                let keys = self.active_keys();
                debug!("{trigger}: revalidating {} keys", keys.len());
                for key in keys {
                    self.revalidate_with(&key, trigger);
                }
            }
        }
    }

    pub fn active_keys(&self) -> Vec<ResourceKey> {
        self.inner
            .entries
            .iter()
            .filter(|e| e.subscribers > 0)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn is_in_flight(&self, key: &ResourceKey) -> bool {
        self.inner
            .entries
            .get(key)
            .map_or(false, |e| e.in_flight.is_some())
    }

    /// Receiver that ticks whenever any entry changes.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    fn revalidate_with(&self, key: &ResourceKey, trigger: &Trigger) -> Revalidation {
        let ticket = {
            let Some(mut entry) = self.inner.entries.get_mut(key) else {
                return Revalidation::Inactive;
            };
            if entry.subscribers == 0 {
                return Revalidation::Inactive;
            }
            if entry.in_flight.is_some() {
                debug!("{key}: {trigger} coalesced into in-flight fetch");
                return Revalidation::Coalesced;
            }
            match trigger {
                Trigger::Interval(_) if !entry.interval_due(self.inner.settings.retry_limit) => {
                    debug!("{key}: backing off after {} failures", entry.failures);
                    return Revalidation::BackedOff;
                }
                Trigger::Mount(_)
                    if !entry.stale
                        && entry
                            .applied_at
                            .map_or(false, |t| t.elapsed() < self.inner.settings.dedupe_window) =>
                {
                    return Revalidation::Deduped;
                }
                _ => {}
            }
            let Some(fetcher) = entry.fetcher.clone() else {
                return Revalidation::Inactive;
            };

            entry.next_seq += 1;
            entry.stale = false;
            entry.attempted_at = Some(Instant::now());
            let ticket = Ticket {
                seq: entry.next_seq,
                epoch: entry.epoch,
                issued_at: Utc::now(),
            };

            let weak = Arc::downgrade(&self.inner);
            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                let result = fetcher().await;
                if let Some(inner) = weak.upgrade() {
                    PollingCache { inner }.apply(&task_key, ticket, result);
                }
            });
            entry.in_flight = Some(InFlight {
                ticket,
                abort: handle.abort_handle(),
            });
            ticket
        };

        debug!("{key}: fetch #{} issued ({trigger})", ticket.seq);
        self.bump();
        Revalidation::Issued(ticket.seq)
    }

    /// Store a fetch result. Returns false when the result was discarded.
    fn apply(&self, key: &ResourceKey, ticket: Ticket, result: Result<Value, FetchError>) -> bool {
        let retry_limit = self.inner.settings.retry_limit;
        let mut reconnected = false;
        let follow_up = {
            let Some(mut entry) = self.inner.entries.get_mut(key) else {
                return false;
            };
            if entry.epoch != ticket.epoch {
                debug!("{key}: fetch #{} finished after teardown, dropped", ticket.seq);
                return false;
            }
            if entry
                .in_flight
                .as_ref()
                .map_or(false, |f| f.ticket.seq == ticket.seq)
            {
                entry.in_flight = None;
            }
            if ticket.seq <= entry.applied_seq {
                debug!(
                    "{key}: fetch #{} older than applied #{}, dropped",
                    ticket.seq, entry.applied_seq
                );
                return false;
            }

            match result {
                Ok(value) => {
                    if entry.failures >= retry_limit {
                        info!("{key}: recovered after {} failed fetches", entry.failures);
                    }
                    entry.value = Some(value);
                    entry.error = None;
                    entry.fetched_at = Some(ticket.issued_at);
                    entry.applied_at = Some(Instant::now());
                    entry.applied_seq = ticket.seq;
                    entry.failures = 0;
                    reconnected = self.inner.offline.swap(false, Ordering::SeqCst);
                }
                Err(e) => {
                    entry.failures += 1;
                    if e.is_network() {
                        self.inner.offline.store(true, Ordering::SeqCst);
                    }
                    if entry.failures == retry_limit {
                        warn!("{key}: {} consecutive failures, backing off interval polling: {e}", entry.failures);
                    } else {
                        warn!("{key}: fetch #{} failed ({}/{retry_limit}): {e}", ticket.seq, entry.failures);
                    }
                    entry.error = Some(e);
                }
            }
            std::mem::take(&mut entry.stale) && entry.subscribers > 0
        };

        self.bump();
        if reconnected {
            info!("Backend reachable again, revalidating active resources");
            self.inner.sink.reconnect();
        }
        if follow_up {
            self.revalidate(key);
        }
        true
    }

    fn release(&self, key: &ResourceKey) {
        {
            let Some(mut entry) = self.inner.entries.get_mut(key) else {
                return;
            };
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers > 0 {
                return;
            }
            entry.timer = None;
            entry.epoch += 1;
            entry.stale = false;
            if let Some(flight) = entry.in_flight.take() {
                flight.abort.abort();
                debug!("{key}: fetch #{} cancelled on teardown", flight.ticket.seq);
            }
            debug!("{key}: last subscriber left");
        }
        self.bump();
    }

    fn bump(&self) {
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// A live interest in one key. Dropping the last subscription of a key stops
/// its polling and cancels its in-flight fetch; the cached value is kept.
pub struct Subscription<T> {
    cache: PollingCache,
    key: Option<ResourceKey>,
    updates: watch::Receiver<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub fn key(&self) -> Option<&ResourceKey> {
        self.key.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        match &self.key {
            Some(key) => self.cache.snapshot(key),
            None => Snapshot::empty(),
        }
    }

    pub fn refresh(&self) -> Revalidation {
        match &self.key {
            Some(key) => self.cache.revalidate(key),
            None => Revalidation::Inactive,
        }
    }

    /// Wait for the next change anywhere in the cache.
    pub async fn changed(&mut self) -> bool {
        self.updates.changed().await.is_ok()
    }

    /// Wait until no fetch is running for this key.
    pub async fn settled(&mut self) -> Snapshot<T> {
        loop {
            let snap = self.snapshot();
            if !snap.is_validating || !self.changed().await {
                return snap;
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.cache.release(&key);
        }
    }
}
