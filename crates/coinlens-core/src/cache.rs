//! In-memory TTL cache for aggregated results, with per-request single-flight.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::data_source::{HistoryBatch, RequestKind, SampleBatch};
use crate::error::{AggregateError, SourceFailure};
use crate::{Period, ProviderId, Ticker};

/// Cache key: a pure function of the request's kind, ticker and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub kind: RequestKind,
    pub ticker: Ticker,
    pub period: Option<Period>,
}

impl Fingerprint {
    pub const fn current(ticker: Ticker) -> Self {
        Self {
            kind: RequestKind::Current,
            ticker,
            period: None,
        }
    }

    pub const fn history(ticker: Ticker, period: Period) -> Self {
        Self {
            kind: RequestKind::History,
            ticker,
            period: Some(period),
        }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.period {
            Some(period) => write!(f, "{}:{}:{}", self.kind, self.ticker, period),
            None => write!(f, "{}:{}", self.kind, self.ticker),
        }
    }
}

/// Aggregated result stored under a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedPayload {
    Samples(SampleBatch),
    History(HistoryBatch),
}

/// Outcome of one fan-out, shared with every caller that joined it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: CachedPayload,
    pub source_chain: Vec<ProviderId>,
    pub failures: Vec<SourceFailure>,
}

/// In-flight marker for one fingerprint. The first caller to drive
/// [`OnceCell::get_or_init`] performs the fan-out; the rest wait on it.
pub type Flight = Arc<OnceCell<Result<Fetched, AggregateError>>>;

/// Answer from [`CacheStore::begin`].
#[derive(Debug)]
pub enum Slot {
    Fresh(CachedPayload),
    InFlight(Flight),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: CachedPayload,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<Fingerprint, CacheEntry>,
    inflight: HashMap<Fingerprint, Flight>,
}

impl CacheInner {
    fn get(&self, key: &Fingerprint) -> Option<CachedPayload> {
        let now = Instant::now();
        self.map
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone())
    }
}

/// Thread-safe TTL store shared by all requests of one aggregator.
///
/// An entry is visible strictly before `stored_at + ttl`. Expired entries
/// are never returned; they linger until [`CacheStore::clear_expired`] or an
/// overwrite removes them.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    inner: Arc<RwLock<CacheInner>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh payload for `key`, or `None` when absent or expired.
    pub async fn lookup(&self, key: &Fingerprint) -> Option<CachedPayload> {
        let store = self.inner.read().await;
        store.get(key)
    }

    /// Overwrites the slot and resets its expiry to `now + ttl`.
    pub async fn store(&self, key: Fingerprint, payload: CachedPayload, ttl: Duration) {
        let mut store = self.inner.write().await;
        store.map.insert(
            key,
            CacheEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Returns a fresh payload, or the in-flight marker for `key`, creating
    /// it when no fan-out is running. Both checks happen under one lock.
    pub async fn begin(&self, key: &Fingerprint) -> Slot {
        let mut store = self.inner.write().await;
        if let Some(payload) = store.get(key) {
            return Slot::Fresh(payload);
        }

        // A settled flight is never joined: its success is already cached and
        // its failure must not be replayed to later callers.
        match store.inflight.get(key) {
            Some(flight) if !flight.initialized() => Slot::InFlight(Arc::clone(flight)),
            _ => {
                let flight: Flight = Arc::new(OnceCell::new());
                store.inflight.insert(*key, Arc::clone(&flight));
                Slot::InFlight(flight)
            }
        }
    }

    /// Drops the in-flight marker if it is still `flight`.
    pub async fn finish(&self, key: &Fingerprint, flight: &Flight) {
        let mut store = self.inner.write().await;
        let is_current = store
            .inflight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight));
        if is_current {
            store.inflight.remove(key);
        }
    }

    pub async fn clear_expired(&self) -> usize {
        let mut store = self.inner.write().await;
        let now = Instant::now();
        let before = store.map.len();
        store.map.retain(|_, entry| entry.is_fresh(now));
        before - store.map.len()
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs [`CacheStore::clear_expired`] every `period` until aborted.
    pub fn spawn_janitor(&self, period: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = cache.clear_expired().await;
                if evicted > 0 {
                    debug!(evicted, "evicted expired cache entries");
                }
            }
        })
    }
}
