//! JSON-RPC chain client.
//!
//! Speaks the Solana JSON-RPC dialect: token accounts are listed with
//! `getTokenAccountsByOwner` in `jsonParsed` encoding and mint supply comes
//! from `getTokenSupply`.

use super::chain::{AccountFilter, ChainClient, ChainError, TokenAccount};
use crate::error::{Error, Result};
use crate::identity::Identity;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chain client backed by an HTTP JSON-RPC endpoint.
pub struct RpcChainClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: AccountBody,
}

#[derive(Deserialize)]
struct AccountBody {
    data: AccountData,
}

#[derive(Deserialize)]
struct AccountData {
    parsed: ParsedAccount,
}

#[derive(Deserialize)]
struct ParsedAccount {
    info: TokenAccountInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    mint: String,
    token_amount: UiTokenAmount,
}

#[derive(Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
}

impl UiTokenAmount {
    fn raw(&self) -> std::result::Result<u64, ChainError> {
        self.amount
            .parse()
            .map_err(|_| ChainError::Malformed(format!("non-integer amount {:?}", self.amount)))
    }
}

impl RpcChainClient {
    /// Create a client for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build RPC client: {e}")))?;

        info!("Chain RPC client targeting {url} (timeout={timeout:?})");

        Ok(Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("rpc call {method} id={id}");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout
                } else {
                    ChainError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("rpc {method} returned HTTP {status}");
            return Err(ChainError::Transport(format!("HTTP {status}")));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Malformed(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| ChainError::Malformed(format!("{method}: missing result")))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn token_accounts(
        &self,
        owner: &Identity,
        filter: &AccountFilter,
    ) -> std::result::Result<Vec<TokenAccount>, ChainError> {
        let filter = match filter {
            AccountFilter::Mint(mint) => json!({ "mint": mint }),
            AccountFilter::Program(program) => json!({ "programId": program }),
        };
        let result: WithContext<Vec<KeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner.as_str(), filter, { "encoding": "jsonParsed" }]),
            )
            .await?;

        result
            .value
            .into_iter()
            .map(|keyed| {
                let info = keyed.account.data.parsed.info;
                Ok(TokenAccount {
                    address: keyed.pubkey,
                    amount: info.token_amount.raw()?,
                    decimals: info.token_amount.decimals,
                    mint: info.mint,
                })
            })
            .collect()
    }

    async fn mint_supply(&self, mint: &str) -> std::result::Result<u64, ChainError> {
        let result: WithContext<UiTokenAmount> =
            self.call("getTokenSupply", json!([mint])).await?;
        result.value.raw()
    }
}
