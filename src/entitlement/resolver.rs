//! Entitlement resolver combining chain queries and the balance cache.
//!
//! This is the core access decision for stream-gate.

use super::cache::{BalanceCache, CacheKey, CacheStats};
use super::chain::{AccountFilter, ChainClient, ChainError};
use super::collection::CollectionVerifier;
use super::rule::{EntitlementDecision, GateKind, GatingRule};
use crate::clock::Clock;
use crate::config::ChainConfig;
use crate::identity::Identity;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the entitlement resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Time budget for all chain queries behind one decision.
    pub query_timeout: Duration,
    /// Token program owning NFT accounts.
    pub token_program_id: String,
    /// Balance cache capacity.
    pub cache_capacity: usize,
    /// Most chain queries in flight for one decision.
    pub max_concurrent_queries: usize,
    /// Balance cache freshness window in seconds.
    pub freshness_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&ChainConfig::default())
    }
}

impl From<&ChainConfig> for ResolverConfig {
    fn from(chain: &ChainConfig) -> Self {
        Self {
            query_timeout: chain.query_timeout(),
            token_program_id: chain.token_program_id.clone(),
            cache_capacity: chain.cache_capacity,
            max_concurrent_queries: chain.max_concurrent_queries,
            freshness_secs: chain.freshness_secs,
        }
    }
}

/// Resolves gating rules against chain state.
///
/// Combines:
/// 1. A freshness-bounded cache of observed balances
/// 2. A [`ChainClient`] for fungible balances and NFT holdings
/// 3. A [`CollectionVerifier`] deciding NFT collection membership
pub struct EntitlementResolver {
    chain: Arc<dyn ChainClient>,
    verifier: Arc<dyn CollectionVerifier>,
    cache: BalanceCache,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
}

impl EntitlementResolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        verifier: Arc<dyn CollectionVerifier>,
        clock: Arc<dyn Clock>,
        config: ResolverConfig,
    ) -> Self {
        let cache = BalanceCache::with_capacity(config.cache_capacity, config.freshness_secs);

        info!(
            "Entitlement resolver initialized (collection_policy={}, freshness={}s, timeout={:?})",
            verifier.name(),
            config.freshness_secs,
            config.query_timeout
        );

        Self {
            chain,
            verifier,
            cache,
            clock,
            config,
        }
    }

    /// Evaluate `rule` for `identity` requesting `content_id`.
    ///
    /// Never returns an error: chain failures produce a denied decision
    /// tagged [`Denial::Unavailable`](super::Denial::Unavailable) so callers
    /// can tell them apart from insufficient holdings.
    pub async fn check_access(
        &self,
        identity: &Identity,
        content_id: &str,
        rule: &GatingRule,
    ) -> EntitlementDecision {
        let now = self.clock.now();

        if rule.kind == GateKind::None {
            return EntitlementDecision::observed(identity, content_id, rule, 0, now);
        }

        if !rule.has_valid_address() {
            warn!(
                "Gating rule for {content_id} has malformed address {:?}",
                rule.address
            );
            return EntitlementDecision::unavailable(identity, content_id, rule, now);
        }

        let key = CacheKey::new(identity.as_str(), rule.kind, &rule.address);
        if let Some(balance) = self.cache.get(&key, now) {
            debug!("Balance for {identity} on {} served from cache", rule.address);
            return EntitlementDecision::observed(identity, content_id, rule, balance, now);
        }

        match tokio::time::timeout(self.config.query_timeout, self.observe(identity, rule)).await
        {
            Ok(Ok(balance)) => {
                self.cache.insert(key, balance, now);
                let decision =
                    EntitlementDecision::observed(identity, content_id, rule, balance, now);
                debug!(
                    "Entitlement {identity} -> {content_id}: kind={} balance={} allowed={}",
                    rule.kind.as_str(),
                    balance,
                    decision.allowed
                );
                decision
            }
            Ok(Err(e)) => {
                warn!("Chain query failed for {identity} ({}): {e}", rule.kind.as_str());
                EntitlementDecision::unavailable(identity, content_id, rule, now)
            }
            Err(_) => {
                warn!(
                    "Chain query for {identity} exceeded {:?}",
                    self.config.query_timeout
                );
                EntitlementDecision::unavailable(identity, content_id, rule, now)
            }
        }
    }

    async fn observe(&self, identity: &Identity, rule: &GatingRule) -> Result<u64, ChainError> {
        match rule.kind {
            GateKind::FungibleToken => self.fungible_balance(identity, &rule.address).await,
            GateKind::NftCollection => self.collection_holdings(identity, &rule.address).await,
            GateKind::None => Ok(0),
        }
    }

    /// Sum of balances across every account `identity` holds for `mint`.
    async fn fungible_balance(&self, identity: &Identity, mint: &str) -> Result<u64, ChainError> {
        let accounts = self
            .chain
            .token_accounts(identity, &AccountFilter::Mint(mint.to_string()))
            .await?;

        let total = accounts
            .iter()
            .filter(|a| a.mint == mint)
            .fold(0u64, |sum, a| sum.saturating_add(a.amount));

        debug!(
            "{identity} holds {total} of {mint} across {} accounts",
            accounts.len()
        );
        Ok(total)
    }

    /// Number of distinct collection members `identity` holds.
    async fn collection_holdings(
        &self,
        identity: &Identity,
        collection: &str,
    ) -> Result<u64, ChainError> {
        let accounts = self
            .chain
            .token_accounts(
                identity,
                &AccountFilter::Program(self.config.token_program_id.clone()),
            )
            .await?;

        let candidates: BTreeSet<String> = accounts
            .into_iter()
            .filter(|a| a.is_nft_shaped())
            .map(|a| a.mint)
            .collect();

        if candidates.is_empty() {
            return Ok(0);
        }

        let supplies: Vec<(String, u64)> = stream::iter(candidates.iter().cloned())
            .map(|mint| async move {
                let supply = self.chain.mint_supply(&mint).await?;
                Ok::<_, ChainError>((mint, supply))
            })
            .buffer_unordered(self.config.max_concurrent_queries.max(1))
            .try_collect()
            .await?;

        let mut members = 0u64;
        for (mint, supply) in supplies {
            if supply != 1 {
                continue;
            }
            if self.verifier.is_member(&mint, collection).await? {
                members += 1;
            }
        }

        debug!(
            "{identity} holds {members} members of {collection} ({} NFT candidates)",
            candidates.len()
        );
        Ok(members)
    }

    /// Balance cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
