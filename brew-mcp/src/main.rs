//! brew-mcp — serves one MCP tool per Homebrew subcommand over stdio
//!
//! Startup: load config → build catalog → register tools → serve stdin/stdout.
//! Any catalog or registration problem aborts before the first request is read.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use brew_mcp::audit::{self, AuditLog};
use brew_mcp::binder;
use brew_mcp::catalog::Catalog;
use brew_mcp::config;
use brew_mcp::executor::{Executor, ExecutorSettings};
use brew_mcp::registry::ToolRegistry;
use brew_mcp::server::McpServer;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config::config_path();
    let loaded = config::load_config(&config_path)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    init_tracing(&config.server.log_level);

    info!("brew-mcp {} starting...", env!("CARGO_PKG_VERSION"));
    if found {
        info!("Configuration loaded from {}", config_path.display());
    } else {
        warn!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
    }

    let catalog = if config.commands.is_empty() {
        Catalog::builtin()
    } else {
        Catalog::new(config.commands.clone())
    }
    .context("Invalid command catalog")?;

    let audit_path = config
        .audit
        .log_file
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(audit::default_log_path);
    let audit_log = Arc::new(AuditLog::open(&audit_path)?);

    let settings = ExecutorSettings::from_config(&config.brew);
    info!(
        "Running `{}` with a {}s timeout, PATH={}",
        settings.binary,
        settings.timeout.as_secs(),
        settings.search_path
    );
    let executor = Arc::new(Executor::new(settings, audit_log));

    let mut registry = ToolRegistry::new();
    binder::register_all(&catalog, executor, &mut registry)
        .context("Failed to register brew tools")?;

    let server = McpServer::new(Arc::new(registry), &config.server.name);
    server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("MCP server failed")?;

    info!("brew-mcp shut down");
    Ok(())
}

/// Logs go to stderr; stdout carries the protocol
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .init();
}
