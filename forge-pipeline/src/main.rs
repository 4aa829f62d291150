//! forge-pipeline - idea scanning and scaffold generation service
//!
//! `serve` (the default) runs the scan scheduler and the read-only
//! reporting API side by side; `scan`, `status` and `report` are one-shot
//! operator commands against the same ledger.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge_common::config::{load_toml_config, resolve_root_folder, RootFolder};
use forge_common::db::init_database;
use forge_common::EventBus;
use forge_pipeline::config::PipelineConfig;
use forge_pipeline::db::reports::ledger_stats;
use forge_pipeline::feed::{FeedSource, HttpFeedClient, StaticFeed};
use forge_pipeline::services::{render_report, Pipeline, ScaffoldMaterializer, ScanScheduler};
use forge_pipeline::{build_router, AppState};

/// Events buffered per SSE subscriber
const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "forge-pipeline")]
#[command(about = "Scores feed posts and scaffolds the best ideas")]
#[command(version)]
struct Cli {
    /// Root folder holding the ledger and generated projects
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the scan scheduler and the reporting API (default)
    Serve,
    /// Run one scan cycle and exit
    Scan,
    /// Print ledger counters as JSON
    Status,
    /// Print the markdown idea report
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting idea-forge pipeline (forge-pipeline) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    let toml_config =
        load_toml_config(cli.config.as_deref()).context("Failed to load configuration file")?;
    let root = RootFolder::new(resolve_root_folder(cli.root_folder.as_deref(), &toml_config));
    root.ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", root.path().display());

    let db_path = root.database_path();
    info!("Ledger: {}", db_path.display());
    let db = init_database(&db_path)
        .await
        .context("Failed to open ledger")?;

    let config = Arc::new(
        PipelineConfig::resolve(&db, &toml_config)
            .await
            .context("Invalid pipeline configuration")?,
    );

    match command {
        Command::Serve => serve(db, config, &root).await,
        Command::Scan => scan_once(db, config, &root).await,
        Command::Status => print_status(&db, &config).await,
        Command::Report => {
            let report = render_report(&db, &config, Utc::now()).await?;
            println!("{}", report);
            Ok(())
        }
    }
}

fn build_pipeline(
    db: SqlitePool,
    config: &PipelineConfig,
    root: &RootFolder,
    event_bus: EventBus,
) -> Result<Pipeline> {
    let feed: Arc<dyn FeedSource> = if config.feed.api_key.is_some() {
        info!(base_url = %config.feed.base_url, "Using live feed");
        Arc::new(HttpFeedClient::new(&config.feed)?)
    } else {
        warn!("No feed_api_key configured; using the built-in demo feed");
        Arc::new(StaticFeed::demo())
    };
    let materializer = Arc::new(ScaffoldMaterializer::new(root.projects_dir()));

    Ok(Pipeline::new(db, config, feed, materializer, event_bus))
}

async fn serve(db: SqlitePool, config: Arc<PipelineConfig>, root: &RootFolder) -> Result<()> {
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let pipeline = Arc::new(build_pipeline(db.clone(), &config, root, event_bus.clone())?);

    let scheduler = ScanScheduler::new(pipeline, config.scan_interval());
    let state = AppState::new(db, Arc::clone(&config), event_bus)
        .with_last_cycle(scheduler.last_cycle());
    let app = build_router(state);

    let cancel_token = CancellationToken::new();
    let scheduler_token = cancel_token.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_token).await });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let shutdown_token = cancel_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_token.cancel();
        })
        .await
        .context("Server error")?;

    // Let an in-flight cycle finish its ledger writes
    cancel_token.cancel();
    match scheduler_handle.await {
        Ok(cycles) => info!(cycles, "Scheduler finished"),
        Err(e) => error!("Scheduler task failed: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn scan_once(db: SqlitePool, config: Arc<PipelineConfig>, root: &RootFolder) -> Result<()> {
    let pipeline = build_pipeline(db, &config, root, EventBus::new(EVENT_BUS_CAPACITY))?;
    let report = pipeline.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.error {
        Some(error) if report.is_aborted() => Err(anyhow::anyhow!("Scan cycle aborted: {}", error)),
        _ => Ok(()),
    }
}

async fn print_status(db: &SqlitePool, config: &PipelineConfig) -> Result<()> {
    let stats = ledger_stats(db, config.threshold.raw_tenths(), &config.quota_day(Utc::now())).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Resolves on Ctrl-C (or SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
