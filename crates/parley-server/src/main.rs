//! # Parley Server
//!
//! Realtime chat relay server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (or ./parley.toml if present)
//! parley
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 parley
//!
//! # Adjust log verbosity
//! RUST_LOG=parley=trace parley
//! ```

use anyhow::Result;
use parley_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
