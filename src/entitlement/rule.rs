//! Gating rules and entitlement decisions.

use crate::identity::Identity;
use serde::{Deserialize, Serialize};

/// What kind of holding a rule requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GateKind {
    /// A minimum balance of one fungible token mint.
    FungibleToken,
    /// At least one NFT from a collection.
    NftCollection,
    /// Ungated content.
    None,
}

impl GateKind {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FungibleToken => "fungible_token",
            Self::NftCollection => "nft_collection",
            Self::None => "none",
        }
    }
}

/// Access policy attached to a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatingRule {
    /// Kind of holding required.
    pub kind: GateKind,
    /// Mint address (fungible) or collection address (NFT). Unused for `None`.
    #[serde(default)]
    pub address: String,
    /// Minimum raw balance (fungible) or number of collection members (NFT).
    #[serde(default)]
    pub minimum_amount: u64,
}

impl GatingRule {
    /// An ungated rule.
    #[must_use]
    pub fn open() -> Self {
        Self {
            kind: GateKind::None,
            address: String::new(),
            minimum_amount: 0,
        }
    }

    /// A fungible-token rule.
    #[must_use]
    pub fn fungible(mint: impl Into<String>, minimum_amount: u64) -> Self {
        Self {
            kind: GateKind::FungibleToken,
            address: mint.into(),
            minimum_amount,
        }
    }

    /// An NFT-collection rule.
    #[must_use]
    pub fn nft_collection(collection: impl Into<String>) -> Self {
        Self {
            kind: GateKind::NftCollection,
            address: collection.into(),
            minimum_amount: 1,
        }
    }

    /// Whether the rule's address is a well-formed chain address.
    #[must_use]
    pub fn has_valid_address(&self) -> bool {
        self.kind == GateKind::None || Identity::parse(&self.address).is_ok()
    }
}

/// Whether an observed holding satisfies a rule.
///
/// Fungible rules compare the summed balance with the minimum. NFT rules
/// need at least one member (or `minimum_amount` members, if larger).
#[must_use]
pub const fn meets_threshold(kind: GateKind, observed: u64, minimum: u64) -> bool {
    match kind {
        GateKind::None => true,
        GateKind::FungibleToken => observed >= minimum,
        GateKind::NftCollection => {
            let required = if minimum == 0 { 1 } else { minimum };
            observed >= required
        }
    }
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    /// Holdings below the rule's threshold. Not retryable.
    InsufficientBalance,
    /// Chain state could not be observed. Retryable.
    Unavailable,
}

impl Denial {
    /// Stable name used in responses and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientBalance => "insufficient_balance",
            Self::Unavailable => "unavailable",
        }
    }
}

impl From<Denial> for crate::Error {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::InsufficientBalance => Self::InsufficientEntitlement,
            Denial::Unavailable => {
                Self::Unavailable("chain state could not be observed".to_string())
            }
        }
    }
}

/// Outcome of evaluating a gating rule. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementDecision {
    /// Requesting identity.
    pub identity: Identity,
    /// Content being requested.
    pub content_id: String,
    /// Rule kind evaluated.
    pub kind: GateKind,
    /// Summed balance or verified member count; 0 when unavailable.
    pub observed_balance: u64,
    /// Whether access is granted.
    pub allowed: bool,
    /// Unix time of evaluation.
    pub evaluated_at: u64,
    /// Reason for denial, if denied.
    pub denial: Option<Denial>,
}

impl EntitlementDecision {
    /// Decision derived from an observed balance.
    #[must_use]
    pub fn observed(
        identity: &Identity,
        content_id: &str,
        rule: &GatingRule,
        observed_balance: u64,
        evaluated_at: u64,
    ) -> Self {
        let allowed = meets_threshold(rule.kind, observed_balance, rule.minimum_amount);
        Self {
            identity: identity.clone(),
            content_id: content_id.to_string(),
            kind: rule.kind,
            observed_balance,
            allowed,
            evaluated_at,
            denial: (!allowed).then_some(Denial::InsufficientBalance),
        }
    }

    /// Fail-closed decision when chain state is unavailable.
    #[must_use]
    pub fn unavailable(
        identity: &Identity,
        content_id: &str,
        rule: &GatingRule,
        evaluated_at: u64,
    ) -> Self {
        Self {
            identity: identity.clone(),
            content_id: content_id.to_string(),
            kind: rule.kind,
            observed_balance: 0,
            allowed: false,
            evaluated_at,
            denial: Some(Denial::Unavailable),
        }
    }

    /// The observed balance, or the denial as an error.
    ///
    /// # Errors
    ///
    /// `InsufficientEntitlement` when holdings fall short, `Unavailable` when
    /// chain state could not be observed.
    pub fn require(&self) -> crate::Result<u64> {
        match self.denial {
            None => Ok(self.observed_balance),
            Some(denial) => Err(denial.into()),
        }
    }
}
