//! fxshadow runner - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Virtual/real order lifecycle runner for MT5-style accounts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via FXSHADOW_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    fxshadow_telemetry::init_logging()?;

    info!("Starting fxshadow v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > FXSHADOW_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("FXSHADOW_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = fxshadow_bot::AppConfig::from_file(&config_path)?;
    info!(
        bridge_url = %config.bridge_url,
        accounts = config.accounts.len(),
        timezone = %config.engine.timezone,
        "Configuration loaded"
    );

    let app = fxshadow_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
