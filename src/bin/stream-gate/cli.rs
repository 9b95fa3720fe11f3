//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use stream_gate::config::{GatewayConfig, LogFormat, Posture};

/// Access-control gateway for token-gated media streaming.
#[derive(Parser, Debug)]
#[command(name = "stream-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, short, env = "STREAM_GATE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Deployment posture. Production refuses weak or missing secrets.
    #[arg(long, value_enum, env = "STREAM_GATE_POSTURE")]
    pub posture: Option<CliPosture>,

    /// Token signing secret, hex encoded.
    #[arg(long, env = "STREAM_GATE_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Chain JSON-RPC endpoint.
    #[arg(long, env = "STREAM_GATE_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Capability token lifetime in seconds (1-30).
    #[arg(long, env = "STREAM_GATE_TOKEN_TTL")]
    pub token_ttl: Option<u64>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "STREAM_GATE_LOG_FORMAT")]
    pub log_format: CliLogFormat,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short, env = "STREAM_GATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Posture CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliPosture {
    /// Local development.
    Development,
    /// Production deployment.
    Production,
}

/// Log format CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a `GatewayConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<GatewayConfig> {
        let mut config = if let Some(ref path) = self.config {
            GatewayConfig::from_file(path)?
        } else {
            GatewayConfig::default()
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(posture) = self.posture {
            config.posture = posture.into();
        }
        if let Some(secret) = self.secret {
            config.token.secret_hex = Some(secret);
        }
        if let Some(rpc_url) = self.rpc_url {
            config.chain.rpc_url = rpc_url;
        }
        if let Some(ttl) = self.token_ttl {
            config.token.ttl_secs = ttl;
        }
        config.log_level = self.log_level;
        config.log_format = self.log_format.into();

        Ok(config)
    }
}

impl From<CliPosture> for Posture {
    fn from(p: CliPosture) -> Self {
        match p {
            CliPosture::Development => Self::Development,
            CliPosture::Production => Self::Production,
        }
    }
}

impl From<CliLogFormat> for LogFormat {
    fn from(f: CliLogFormat) -> Self {
        match f {
            CliLogFormat::Text => Self::Text,
            CliLogFormat::Json => Self::Json,
        }
    }
}
