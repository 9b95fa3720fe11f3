//! Fixed-window per-identity rate limiting.
//!
//! This is a hard block: it protects the resolver's chain queries and the
//! delivery endpoint. If the store is unreachable the limiter allows the
//! request and raises an operational alert.

use super::store::CounterStore;
use crate::clock::Clock;
use crate::config::WindowLimit;
use crate::event::{GateEvent, GateEventsSender};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which endpoint a limiter protects. Each scope counts separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// `POST /gate`.
    Gate,
    /// `GET /stream/{token}`.
    Stream,
    /// `POST /stream/{token}/report`.
    Report,
}

impl LimitScope {
    /// Key prefix in the counter store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gate => "gate",
            Self::Stream => "stream",
            Self::Report => "report",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Seconds until the current window closes, when denied.
    pub retry_after_secs: Option<u64>,
}

impl RateDecision {
    const fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: None,
        }
    }
}

/// Per-identity fixed-window limiter over a [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limit: WindowLimit,
    scope: LimitScope,
    events: Option<GateEventsSender>,
}

impl RateLimiter {
    /// Create a limiter for one scope.
    #[must_use]
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        limit: WindowLimit,
        scope: LimitScope,
    ) -> Self {
        Self {
            store,
            clock,
            limit,
            scope,
            events: None,
        }
    }

    /// Publish store degradation on `events`.
    #[must_use]
    pub fn with_events(mut self, events: GateEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Count one request for `identity` and decide whether it may proceed.
    pub async fn check(&self, identity: &str) -> RateDecision {
        let window = self.limit.window_secs.max(1);
        let now = self.clock.now();
        let window_start = now - now % window;
        let key = format!("rl:{}:{identity}", self.scope.as_str());

        match self.store.increment(&key, window_start, window).await {
            Ok(count) if count <= self.limit.max_requests => RateDecision::allow(),
            Ok(count) => {
                let retry_after = (window_start + window).saturating_sub(now).max(1);
                debug!(
                    "Rate limited {identity} on {} ({count}/{} in window, retry in {retry_after}s)",
                    self.scope.as_str(),
                    self.limit.max_requests
                );
                RateDecision {
                    allowed: false,
                    retry_after_secs: Some(retry_after),
                }
            }
            Err(e) => {
                warn!(
                    target: "stream_gate::alert",
                    scope = self.scope.as_str(),
                    "Rate limiter store unavailable, failing open: {e}"
                );
                if let Some(events) = &self.events {
                    let _ = events.send(GateEvent::StoreDegraded {
                        component: "rate_limiter",
                        message: e.to_string(),
                    });
                }
                RateDecision::allow()
            }
        }
    }
}
