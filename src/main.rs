//! # Marketplace Realtime
//!
//! Real-time delivery and presence server for the marketplace chat.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database connection pool (conversation membership)
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use marketplace_realtime::config::Settings;
use marketplace_realtime::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    marketplace_realtime::telemetry::init_tracing();

    info!("Starting Marketplace Realtime...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
