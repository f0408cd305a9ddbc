//! # Huddle Server
//!
//! Realtime chat relay: rooms, member lists, messages, and typing notices
//! over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (port 3001)
//! huddle
//!
//! # Run with a config file
//! HUDDLE_CONFIG=/path/to/huddle.toml huddle
//!
//! # Run with environment variables
//! PORT=8080 HUDDLE_ENV=production huddle
//! ```

mod config;
mod dispatch;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_server=debug,huddle_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        environment = ?config.environment,
        "Starting Huddle server on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
