//! RoadPulse server
//!
//! Receives device uploads, maintains road defect clusters in a sled
//! database and serves them to the map dashboard.
//!
//! # Usage
//!
//! ```bash
//! ROADPULSE_UPLOAD_KEY=... ROADPULSE_ADMIN_KEY=... ./roadpulse
//! ./roadpulse --config /etc/roadpulse.toml --addr 0.0.0.0:2101
//! ./roadpulse --reset-db
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (default: info)
//! - `ROADPULSE_CONFIG`: Config file path
//! - `ROADPULSE_UPLOAD_KEY` / `ROADPULSE_DELETE_KEY` / `ROADPULSE_ADMIN_KEY`: API keys
//! - `ROADPULSE_SERVER_ADDR`, `ROADPULSE_DB_PATH`: Override the config file
//! - `ROADPULSE_CORS_ORIGINS`: Extra allowed CORS origins
//! - `RESET_DB`: Set to "true" to wipe the cluster database on startup

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use roadpulse::api::{create_app, ApiState};
use roadpulse::{IngestPipeline, RoadPulseConfig, SledClusterStore};

#[derive(Parser, Debug)]
#[command(name = "roadpulse")]
#[command(about = "RoadPulse road defect mapping server")]
#[command(version)]
struct CliArgs {
    /// Config file (default search: $ROADPULSE_CONFIG, ./roadpulse.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the server address (default: "127.0.0.1:2101")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the sled database directory
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Wipe the cluster database on startup.
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Remove the sled database directory.
fn reset_database(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        info!(path = %db_path.display(), "Database does not exist, nothing to reset");
        return Ok(());
    }

    warn!(path = %db_path.display(), "RESET_DB: wiping cluster database");
    std::fs::remove_dir_all(db_path)
        .with_context(|| format!("Failed to remove database at {}", db_path.display()))?;
    warn!("Database removed; a fresh one will be created");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn warn_on_unset_keys(config: &RoadPulseConfig) {
    let keys = [
        ("ROADPULSE_UPLOAD_KEY", &config.auth.upload_key, "/upload"),
        ("ROADPULSE_DELETE_KEY", &config.auth.delete_key, "/delete-all"),
        ("ROADPULSE_ADMIN_KEY", &config.auth.admin_key, "/api/delete-point"),
    ];
    for (var, key, endpoint) in keys {
        if key.is_empty() {
            warn!(endpoint, "{} not set; endpoint disabled", var);
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let mut config =
        RoadPulseConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(db_path) = args.db_path {
        config.storage.path = db_path;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        db = %config.storage.path.display(),
        "Starting RoadPulse"
    );
    warn_on_unset_keys(&config);

    if should_reset_db(args.reset_db) {
        reset_database(&config.storage.path)?;
    }

    let store = SledClusterStore::open(&config.storage.path).with_context(|| {
        format!(
            "Failed to open cluster database at {}",
            config.storage.path.display()
        )
    })?;
    info!(size_bytes = store.size_bytes(), "Cluster database ready");

    let pipeline = Arc::new(IngestPipeline::new(Arc::new(store.clone()), &config));
    let app = create_app(ApiState::new(pipeline, &config));

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!(addr = %config.server.addr, "HTTP server listening");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await
        .context("HTTP server error")?;

    store.flush().context("Failed to flush cluster database")?;
    info!("Shutdown complete");
    Ok(())
}
