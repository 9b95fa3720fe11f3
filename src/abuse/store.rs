//! Shared counter and event-window store.
//!
//! The rate limiter and abuse monitor never hold state of their own; they go
//! through a [`CounterStore`] so a multi-instance deployment can back it with
//! shared storage. [`InMemoryCounterStore`] is the single-process default.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// A playback report held in an identity's rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Content that was played.
    pub content_id: String,
    /// Unix time the report was recorded.
    pub timestamp: u64,
    /// Seconds the client reports having listened.
    pub listened_duration_secs: f64,
}

/// Errors from a counter store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic counters and per-identity event windows.
///
/// Both operations must be atomic per key: two concurrent calls for the same
/// key must both be reflected in the result of the later one.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` in the fixed window starting at
    /// `window_start` and return the new count. A counter from an earlier
    /// window is reset first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend is unavailable.
    async fn increment(&self, key: &str, window_start: u64, window_secs: u64)
        -> Result<u64, StoreError>;

    /// Append `event` to the window for `identity`, drop events older than
    /// `now - retention_secs`, keep at most the newest `max_events`, and
    /// return the remaining window.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend is unavailable.
    async fn append_and_prune(
        &self,
        identity: &str,
        event: StreamEvent,
        retention_secs: u64,
        max_events: usize,
        now: u64,
    ) -> Result<Vec<StreamEvent>, StoreError>;

    /// Remove expired counters and empty windows. Returns entries removed.
    async fn sweep(&self, now: u64) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    window_start: u64,
    expires_at: u64,
    count: u64,
}

#[derive(Debug, Default)]
struct Window {
    retention_secs: u64,
    events: VecDeque<StreamEvent>,
}

impl Window {
    fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.retention_secs);
        while self.events.front().is_some_and(|e| e.timestamp < cutoff) {
            self.events.pop_front();
        }
    }

    fn truncate_front(&mut self, max_events: usize) {
        let excess = self.events.len().saturating_sub(max_events);
        self.events.drain(..excess);
    }
}

/// Process-local store on sharded concurrent maps.
///
/// Each key is updated under its shard's entry lock, never a global one.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
    windows: DashMap<String, Window>,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters.
    #[must_use]
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Number of identities with a non-empty window.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(
        &self,
        key: &str,
        window_start: u64,
        window_secs: u64,
    ) -> Result<u64, StoreError> {
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            window_start,
            expires_at: window_start.saturating_add(window_secs),
            count: 0,
        });
        if entry.window_start != window_start {
            *entry = Counter {
                window_start,
                expires_at: window_start.saturating_add(window_secs),
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);
        Ok(entry.count)
    }

    async fn append_and_prune(
        &self,
        identity: &str,
        event: StreamEvent,
        retention_secs: u64,
        max_events: usize,
        now: u64,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        let mut window = self.windows.entry(identity.to_string()).or_default();
        window.retention_secs = retention_secs;
        window.events.push_back(event);
        window.prune(now);
        window.truncate_front(max_events);
        Ok(window.events.iter().cloned().collect())
    }

    async fn sweep(&self, now: u64) -> usize {
        let counters_before = self.counters.len();
        self.counters.retain(|_, c| c.expires_at > now);

        let windows_before = self.windows.len();
        self.windows.retain(|_, w| {
            w.prune(now);
            !w.events.is_empty()
        });

        let removed = counters_before.saturating_sub(self.counters.len())
            + windows_before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Counter store swept {removed} expired entries");
        }
        removed
    }
}
