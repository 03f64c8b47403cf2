//! TicketLens MCP Server
//!
//! CLI spawned by an MCP client for read-only access to help-desk
//! conversations. Communicates via stdio JSON-RPC, so all logging goes to
//! a file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use ticketlens_core::config::Config;
use ticketlens_core::mcp::McpServer;
use ticketlens_core::{ApiClient, ContentNormalizer, SearchEngine};

#[derive(Parser)]
#[command(name = "ticketlens-mcp")]
#[command(about = "TicketLens MCP server for help-desk conversation search", long_about = None)]
struct Cli {
    /// Path to config.toml (default: ~/.config/ticketlens/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter, overriding the config file (e.g. "debug")
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config first to get log path
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let config = Arc::new(config);

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "mcp.log");

    // --log-level, then RUST_LOG, then the config file
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(file_layer.with_filter(filter))
        .init();

    info!("TicketLens MCP server starting");

    if !config.has_credentials() {
        warn!("No API credentials configured; tool calls will fail until client_id/client_secret or access_token is set");
    }

    let client = ApiClient::new(config.api.clone())?;
    let engine = SearchEngine::new(
        Arc::new(client),
        ContentNormalizer::from_config(&config.normalize),
        config.search.clone(),
    );

    let server = McpServer::new(Arc::new(engine), config);
    server.run().await?;

    info!("TicketLens MCP server stopped");
    Ok(())
}
