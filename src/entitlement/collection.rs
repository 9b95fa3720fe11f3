//! NFT collection membership checks.
//!
//! Verifying that a mint really belongs to a collection needs metadata the
//! token program does not carry. The verifier is a seam so the coarse
//! program-ownership policy can be swapped for a stricter one without
//! touching the resolver.

use super::chain::ChainError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Decides whether an NFT mint is a member of a collection.
#[async_trait]
pub trait CollectionVerifier: Send + Sync {
    /// Whether `mint` belongs to `collection`.
    async fn is_member(&self, mint: &str, collection: &str) -> Result<bool, ChainError>;

    /// Policy name for logs.
    fn name(&self) -> &'static str;
}

/// Treats every zero-decimal, supply-1 token under the program as a member.
///
/// This is a known relaxation: it cannot tell one collection from another.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgramOwnershipVerifier;

#[async_trait]
impl CollectionVerifier for ProgramOwnershipVerifier {
    async fn is_member(&self, mint: &str, collection: &str) -> Result<bool, ChainError> {
        debug!(mint, collection, "program-ownership policy accepts NFT");
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "program_ownership"
    }
}

/// Accepts only mints explicitly listed for a collection.
#[derive(Debug, Default, Clone)]
pub struct MintAllowlistVerifier {
    members: HashMap<String, HashSet<String>>,
}

impl MintAllowlistVerifier {
    /// Build from a collection -> member mints map.
    #[must_use]
    pub fn new(collections: &BTreeMap<String, Vec<String>>) -> Self {
        let members = collections
            .iter()
            .map(|(collection, mints)| (collection.clone(), mints.iter().cloned().collect()))
            .collect();
        Self { members }
    }

    /// Number of collections known.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.members.len()
    }
}

#[async_trait]
impl CollectionVerifier for MintAllowlistVerifier {
    async fn is_member(&self, mint: &str, collection: &str) -> Result<bool, ChainError> {
        Ok(self
            .members
            .get(collection)
            .is_some_and(|mints| mints.contains(mint)))
    }

    fn name(&self) -> &'static str {
        "mint_allowlist"
    }
}
