//! Abuse monitoring and rate limiting.
//!
//! ```text
//! request ──► RateLimiter::check ──► CounterStore::increment
//!                 (hard block, 429)
//!
//! report  ──► AbuseMonitor::record_and_evaluate ──► CounterStore::append_and_prune
//!                 (advisory: logs + GateEvent only, newest events kept)
//! ```
//!
//! Both fail open when the store is unreachable. The entitlement resolver,
//! by contrast, fails closed.

mod monitor;
mod rate_limit;
mod store;

pub use monitor::{evaluate, AbuseMonitor, AbuseReason, AbuseVerdict};
pub use rate_limit::{LimitScope, RateDecision, RateLimiter};
pub use store::{CounterStore, InMemoryCounterStore, StoreError, StreamEvent};

#[cfg(test)]
pub(crate) use store::fake;
