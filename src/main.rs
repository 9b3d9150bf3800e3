//! Pricewatch - Product Price Tracking Daemon
//!
//! Ingests listing snapshots into SQLite, re-observes tracked products on
//! a schedule and notifies subscribers of interesting changes.

use clap::Parser;
use pricewatch::{HttpSnapshotSource, ProductStore, Tracker, WebhookDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Product price tracker - watches listings and notifies subscribers
#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Base URL of the snapshot extraction service
    #[arg(long)]
    source_url: String,

    /// Webhook endpoint notifications are POSTed to
    #[arg(long)]
    webhook_url: String,

    /// Product URLs to ingest on startup (repeatable)
    #[arg(long = "track")]
    track: Vec<String>,

    /// Run a single sweep and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Sweep interval in hours when running continuously
    #[arg(long, default_value_t = 6)]
    interval_hours: u64,

    /// Enable the REST API on the specified port (default: disabled)
    #[arg(long)]
    web_port: Option<u16>,
}

/// Returns the default database path: ~/.local/share/pricewatch/pricewatch.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pricewatch")
        .join("pricewatch.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting pricewatch...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let store = match ProductStore::open(&db_path) {
        Ok(store) => {
            log::info!("Opened database: {}", db_path.display());
            store
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let source = Arc::new(HttpSnapshotSource::new(args.source_url.clone()));
    let dispatcher = Arc::new(WebhookDispatcher::new(args.webhook_url.clone()));
    let tracker = Arc::new(Tracker::new(store, source, dispatcher));

    // Spawn web server if --web-port specified
    if let Some(port) = args.web_port {
        let web_tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            if let Err(e) = pricewatch::web::serve(web_tracker, port).await {
                log::error!("Web server error: {}", e);
            }
        });
    }

    // Ingest seed URLs
    for url in &args.track {
        if let Err(e) = tracker.ingest(url).await {
            log::error!("Failed to track {}: {}", url, e);
        }
    }

    if args.once {
        run_sweep(&tracker).await;
    } else {
        log::info!(
            "Running in daemon mode, sweeping every {} hour(s)",
            args.interval_hours
        );
        run_daemon(&tracker, args.interval_hours).await;
    }
}

/// Run the sweep daemon until a shutdown signal arrives
async fn run_daemon(tracker: &Tracker, interval_hours: u64) {
    let mut ticker = interval(Duration::from_secs(interval_hours * 3600));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_sweep(tracker).await;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown signal received, exiting");
                break;
            }
        }
    }
}

/// Run a single sweep over all tracked products
async fn run_sweep(tracker: &Tracker) {
    match tracker.sweep().await {
        Ok(report) => {
            log::info!(
                "Sweep finished: {} ingested, {} skipped, {} notified, {} failed",
                report.ingested,
                report.skipped,
                report.notified,
                report.failed
            );
        }
        Err(e) => {
            log::error!("Sweep failed: {}", e);
        }
    }
}
