//! Configuration for stream-gate.

use crate::entitlement::GatingRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Maximum capability token lifetime in seconds.
pub const MAX_TOKEN_TTL_SECS: u64 = 30;

/// Deployment posture.
///
/// `Production` refuses to start without a strong signing secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    /// Local development: a missing secret is replaced by an ephemeral one.
    #[default]
    Development,
    /// Production: weak or absent secrets are fatal.
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// How NFT collection membership is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionPolicy {
    /// Any zero-decimal, supply-1 token under the token program counts.
    #[default]
    ProgramOwnership,
    /// Only mints listed under the collection in `chain.collections` count.
    MintAllowlist,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Deployment posture.
    #[serde(default)]
    pub posture: Posture,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Interval between sweeps of expired counters, windows and nonces.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Capability token configuration.
    #[serde(default)]
    pub token: TokenConfig,

    /// Chain access configuration.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Abuse heuristics.
    #[serde(default)]
    pub abuse: AbuseConfig,

    /// Media delivery configuration.
    #[serde(default)]
    pub media: MediaConfig,
}

/// Capability token configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Hex-encoded HMAC signing secret (at least 32 bytes).
    #[serde(default)]
    pub secret_hex: Option<String>,

    /// Token lifetime in seconds (1..=30).
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,

    /// How long after expiry a token may still carry a playback report.
    #[serde(default = "default_report_grace")]
    pub report_grace_secs: u64,
}

// Hand-written so the secret never reaches logs via `{:?}`.
impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret_hex", &self.secret_hex.as_ref().map(|_| "<redacted>"))
            .field("ttl_secs", &self.ttl_secs)
            .field("report_grace_secs", &self.report_grace_secs)
            .finish()
    }
}

/// Chain access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Timeout for a single RPC query, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Token program that owns fungible and NFT token accounts.
    #[serde(default = "default_token_program")]
    pub token_program_id: String,

    /// Number of (identity, rule) observations kept in the balance cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Most RPC queries one decision keeps in flight at once.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// How long a chain observation may be reused, in seconds (0 disables).
    #[serde(default = "default_freshness")]
    pub freshness_secs: u64,

    /// NFT collection membership policy.
    #[serde(default)]
    pub collection_policy: CollectionPolicy,

    /// Collection address to member mints, for `mint_allowlist`.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<String>>,

    /// Rules with `minimum_amount` at or above this require proof of key
    /// possession.
    #[serde(default)]
    pub proof_threshold: Option<u64>,

    /// Maximum age of a signed access message, in seconds.
    #[serde(default = "default_proof_max_age")]
    pub proof_max_age_secs: u64,
}

/// Fixed-window limit for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    /// Requests allowed per window.
    pub max_requests: u64,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for WindowLimit {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
        }
    }
}

/// Per-identity rate limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Limit for `POST /gate`.
    #[serde(default)]
    pub gate: WindowLimit,
    /// Limit for `GET /stream/{token}`.
    #[serde(default)]
    pub stream: WindowLimit,
    /// Limit for `POST /stream/{token}/report`.
    #[serde(default)]
    pub report: WindowLimit,
}

/// Abuse heuristic thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseConfig {
    /// Rolling window length in seconds.
    #[serde(default = "default_abuse_window")]
    pub window_secs: u64,

    /// Flag when distinct content ids in window exceed this.
    #[serde(default = "default_breadth_threshold")]
    pub breadth_threshold: usize,

    /// A listen shorter than this many seconds is shallow.
    #[serde(default = "default_shallow_listen")]
    pub shallow_listen_secs: f64,

    /// Flag when shallow listens in window exceed this.
    #[serde(default = "default_shallow_threshold")]
    pub shallow_threshold: usize,

    /// Flag when one content id is reported more than this many times.
    #[serde(default = "default_repetition_threshold")]
    pub repetition_threshold: usize,

    /// Largest playback duration accepted in a report.
    #[serde(default = "default_max_reported_duration")]
    pub max_reported_duration_secs: f64,

    /// Most recent events kept per identity window; older ones are dropped.
    #[serde(default = "default_max_window_events")]
    pub max_window_events: usize,
}

/// A catalogue entry from content management: where the media lives and
/// which holdings unlock it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntry {
    /// Content identifier.
    pub content_id: String,
    /// Object-storage locator (URL).
    pub locator: String,
    /// Access policy for this item. Clients cannot override it.
    pub gating_rule: GatingRule,
    /// Withdrawn content is never served.
    #[serde(default)]
    pub withdrawn: bool,
}

/// Media delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Lifetime of a returned media descriptor in seconds.
    #[serde(default = "default_descriptor_ttl")]
    pub descriptor_ttl_secs: u64,

    /// Static catalogue of content locators.
    #[serde(default)]
    pub catalog: Vec<MediaEntry>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            posture: Posture::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            sweep_interval_secs: default_sweep_interval(),
            token: TokenConfig::default(),
            chain: ChainConfig::default(),
            rate_limit: RateLimitConfig::default(),
            abuse: AbuseConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret_hex: None,
            ttl_secs: default_token_ttl(),
            report_grace_secs: default_report_grace(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            query_timeout_ms: default_query_timeout_ms(),
            token_program_id: default_token_program(),
            cache_capacity: default_cache_capacity(),
            max_concurrent_queries: default_max_concurrent_queries(),
            freshness_secs: default_freshness(),
            collection_policy: CollectionPolicy::default(),
            collections: BTreeMap::new(),
            proof_threshold: None,
            proof_max_age_secs: default_proof_max_age(),
        }
    }
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            window_secs: default_abuse_window(),
            breadth_threshold: default_breadth_threshold(),
            shallow_listen_secs: default_shallow_listen(),
            shallow_threshold: default_shallow_threshold(),
            repetition_threshold: default_repetition_threshold(),
            max_reported_duration_secs: default_max_reported_duration(),
            max_window_events: default_max_window_events(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            descriptor_ttl_secs: default_descriptor_ttl(),
            catalog: Vec::new(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_sweep_interval() -> u64 {
    30
}

const fn default_token_ttl() -> u64 {
    MAX_TOKEN_TTL_SECS
}

const fn default_report_grace() -> u64 {
    3600
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

const fn default_query_timeout_ms() -> u64 {
    3_000
}

fn default_token_program() -> String {
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string()
}

const fn default_cache_capacity() -> usize {
    10_000
}

const fn default_max_concurrent_queries() -> usize {
    8
}

const fn default_freshness() -> u64 {
    10
}

const fn default_proof_max_age() -> u64 {
    120
}

const fn default_abuse_window() -> u64 {
    300
}

const fn default_breadth_threshold() -> usize {
    20
}

const fn default_shallow_listen() -> f64 {
    5.0
}

const fn default_shallow_threshold() -> usize {
    10
}

const fn default_repetition_threshold() -> usize {
    10
}

const fn default_max_reported_duration() -> f64 {
    86_400.0
}

const fn default_max_window_events() -> usize {
    512
}

const fn default_descriptor_ttl() -> u64 {
    30
}

impl ChainConfig {
    /// RPC query timeout as a `Duration`.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would otherwise fail at request time.
    ///
    /// Secret strength is checked separately when the signing secret is
    /// loaded, since it depends on the posture.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid setting.
    pub fn validate(&self) -> crate::Result<()> {
        if self.token.ttl_secs == 0 || self.token.ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(crate::Error::Config(format!(
                "token.ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}, got {}",
                self.token.ttl_secs
            )));
        }
        for (name, limit) in [
            ("gate", self.rate_limit.gate),
            ("stream", self.rate_limit.stream),
            ("report", self.rate_limit.report),
        ] {
            if limit.max_requests == 0 || limit.window_secs == 0 {
                return Err(crate::Error::Config(format!(
                    "rate_limit.{name} needs non-zero max_requests and window_secs"
                )));
            }
        }
        if self.abuse.window_secs == 0 {
            return Err(crate::Error::Config(
                "abuse.window_secs must be non-zero".to_string(),
            ));
        }
        let largest_threshold = self
            .abuse
            .breadth_threshold
            .max(self.abuse.shallow_threshold)
            .max(self.abuse.repetition_threshold);
        if self.abuse.max_window_events <= largest_threshold {
            return Err(crate::Error::Config(format!(
                "abuse.max_window_events must exceed every heuristic threshold ({largest_threshold})"
            )));
        }
        if !self.abuse.shallow_listen_secs.is_finite() || self.abuse.shallow_listen_secs < 0.0 {
            return Err(crate::Error::Config(
                "abuse.shallow_listen_secs must be a non-negative number".to_string(),
            ));
        }
        if self.chain.query_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "chain.query_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.chain.max_concurrent_queries == 0 {
            return Err(crate::Error::Config(
                "chain.max_concurrent_queries must be non-zero".to_string(),
            ));
        }
        if self.chain.collection_policy == CollectionPolicy::MintAllowlist
            && self.chain.collections.is_empty()
        {
            return Err(crate::Error::Config(
                "chain.collection_policy = \"mint_allowlist\" requires chain.collections".to_string(),
            ));
        }
        Ok(())
    }
}
