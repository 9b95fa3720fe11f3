//! stream-gate CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use stream_gate::config::LogFormat;
use stream_gate::GatewayBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.into_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }

    info!("stream-gate v{}", env!("CARGO_PKG_VERSION"));

    let mut gateway = GatewayBuilder::new(config).build().await?;
    gateway.run().await?;

    info!("Goodbye!");
    Ok(())
}
