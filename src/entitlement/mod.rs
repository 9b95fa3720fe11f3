//! Entitlement resolution against on-chain holdings.
//!
//! This module decides whether an identity satisfies a content item's gating
//! rule:
//! 1. `None` rules pass without touching the chain
//! 2. Otherwise reuse a fresh cached observation, or query the chain
//! 3. Compare the observed balance with the rule's minimum
//!
//! # Architecture
//!
//! ```text
//! check_access(identity, rule)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Rule kind == None?  │──yes──► ALLOW (no chain call)
//! └─────────┬───────────┘
//!           │ no
//!           ▼
//! ┌─────────────────────┐
//! │ Check balance cache │
//! └─────────┬───────────┘
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  FRESH         MISS
//!    │             │
//!    │             ▼
//!    │      Query chain (bounded timeout)
//!    │             │
//!    │      ┌──────┴──────┐
//!    │      │             │
//!    │     OK        ERROR/TIMEOUT
//!    │      │             │
//!    ▼      ▼             ▼
//! balance >= minimum?   DENY (unavailable)
//! ```
//!
//! Chain failures always deny. Entitlement is a security boundary, so there
//! is no fail-open switch here.

mod cache;
mod chain;
mod collection;
mod resolver;
mod rpc;
mod rule;

pub use cache::{BalanceCache, CacheStats};
pub use chain::{AccountFilter, ChainClient, ChainError, TokenAccount};
pub use collection::{CollectionVerifier, MintAllowlistVerifier, ProgramOwnershipVerifier};
pub use resolver::{EntitlementResolver, ResolverConfig};
pub use rpc::RpcChainClient;
pub use rule::{meets_threshold, Denial, EntitlementDecision, GateKind, GatingRule};

#[cfg(test)]
pub(crate) use chain::fake;
