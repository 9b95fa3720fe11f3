//! Chain access abstraction.

use crate::identity::Identity;
use async_trait::async_trait;
use thiserror::Error;

/// A token account owned by a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    /// Token account address.
    pub address: String,
    /// Mint the account holds.
    pub mint: String,
    /// Raw balance in base units.
    pub amount: u64,
    /// Mint decimals.
    pub decimals: u8,
}

impl TokenAccount {
    /// Whether the account looks like a single NFT holding.
    ///
    /// Mint supply still has to be checked separately.
    #[must_use]
    pub const fn is_nft_shaped(&self) -> bool {
        self.decimals == 0 && self.amount == 1
    }
}

/// Which token accounts of an owner to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Accounts for one mint.
    Mint(String),
    /// All accounts under a token program.
    Program(String),
}

/// Errors from chain queries.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The query exceeded its time budget.
    #[error("chain query timed out")]
    Timeout,

    /// The node returned a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be interpreted.
    #[error("malformed chain response: {0}")]
    Malformed(String),
}

/// Read-only view of chain state needed for entitlement checks.
///
/// Implementations must not cache; the resolver owns freshness.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// List the token accounts `owner` holds matching `filter`.
    async fn token_accounts(
        &self,
        owner: &Identity,
        filter: &AccountFilter,
    ) -> Result<Vec<TokenAccount>, ChainError>;

    /// Total supply of a mint in base units.
    async fn mint_supply(&self, mint: &str) -> Result<u64, ChainError>;
}
