//! LRU cache for recent chain observations.
//!
//! Caches the balance observed for an (identity, rule target) pair so bursts
//! of gate requests do not each cost an RPC round-trip. Only balances are
//! cached, never decisions: `allowed` is recomputed against the rule every
//! time, and an entry is ignored once older than the freshness window.

use super::rule::GateKind;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key: who, and what they must hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    identity: String,
    kind: GateKind,
    address: String,
}

impl CacheKey {
    /// Key for an identity and rule target.
    #[must_use]
    pub fn new(identity: &str, kind: GateKind, address: &str) -> Self {
        Self {
            identity: identity.to_string(),
            kind,
            address: address.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    balance: u64,
    observed_at: u64,
}

/// Freshness-bounded LRU cache of observed balances.
#[derive(Clone)]
pub struct BalanceCache {
    inner: Arc<Mutex<LruCache<CacheKey, Observation>>>,
    stats: Arc<Mutex<CacheStats>>,
    freshness_secs: u64,
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including stale entries.
    pub misses: u64,
    /// Number of entries added.
    pub additions: u64,
    /// Entries currently held, fresh or not.
    pub entries: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl BalanceCache {
    /// Create a cache with the specified capacity.
    ///
    /// A `freshness_secs` of zero disables caching.
    #[must_use]
    pub fn with_capacity(capacity: usize, freshness_secs: u64) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
            freshness_secs,
        }
    }

    /// Return the cached balance if it was observed less than the freshness
    /// window before `now`.
    pub fn get(&self, key: &CacheKey, now: u64) -> Option<u64> {
        if self.freshness_secs == 0 {
            return None;
        }

        let found = {
            let mut cache = self.inner.lock();
            match cache.get(key).copied() {
                Some(obs) if now.saturating_sub(obs.observed_at) < self.freshness_secs => {
                    Some(obs.balance)
                }
                Some(_) => {
                    cache.pop(key);
                    None
                }
                None => None,
            }
        };

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        found
    }

    /// Record a balance observed at `now`.
    pub fn insert(&self, key: CacheKey, balance: u64, now: u64) {
        if self.freshness_secs == 0 {
            return;
        }
        self.inner.lock().put(
            key,
            Observation {
                balance,
                observed_at: now,
            },
        );
        self.stats.lock().additions += 1;
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.inner.lock().len();
        CacheStats {
            entries,
            ..self.stats.lock().clone()
        }
    }
}
