//! lgw-sync - Legislative Record Synchronization Service
//!
//! Periodically reconciles the remote Congress API with the local store:
//! change detection, batched transactional upserts, post-apply validation
//! with rollback, and a durable run ledger. Exposes an operator HTTP API
//! and executes persisted cron schedules.

use anyhow::Result;
use clap::Parser;
use lgw_common::events::EventBus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lgw_sync::config::ServiceConfig;
use lgw_sync::db::settings::SyncSettings;
use lgw_sync::engine::SyncEngine;
use lgw_sync::fetch::{client::CongressApiClient, congress};
use lgw_sync::models::TriggerSource;
use lgw_sync::{db, scheduler, AppState};

#[derive(Debug, Parser)]
#[command(name = "lgw-sync", about = "LegWatch synchronization engine")]
struct Args {
    /// Root data folder (database, backups)
    #[arg(long)]
    root_folder: Option<String>,

    /// HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Execute one manual run and exit (for external schedulers and
    /// short-lived invocations)
    #[arg(long)]
    once: bool,

    /// Lookback window for --once runs, in days
    #[arg(long, default_value_t = 7)]
    lookback_days: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting lgw-sync (Legislative Record Synchronization)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::resolve(args.root_folder.as_deref(), args.port);
    lgw_common::config::ensure_root_folder(&config.root_folder)?;
    info!("Root folder: {}", config.root_folder.display());

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = db::init_database_pool(&db_path).await?;

    let settings = SyncSettings::load(&db_pool).await?;
    let client = Arc::new(CongressApiClient::new(config.client_config(&settings))?);
    let registry = congress::build_registry(client);

    let event_bus = EventBus::new(100);
    let engine = Arc::new(SyncEngine::new(
        db_pool.clone(),
        event_bus.clone(),
        registry,
        config.backup_dir(),
    ));

    // An earlier process may have died mid-run; continue from the next
    // pending batch before accepting new work
    if let Some(interrupted) = db::runs::find_resumable_run(&db_pool).await? {
        warn!(
            run_id = %interrupted.run_id,
            completed_batches = interrupted.completed_batches,
            "Found interrupted run, resuming"
        );
        let resumed = engine
            .resume_run(interrupted.run_id, CancellationToken::new())
            .await?;
        info!(
            run_id = %resumed.run_id,
            status = resumed.status.as_str(),
            "Interrupted run settled"
        );
    }

    if args.once {
        let run = engine
            .start_run(
                TriggerSource::Manual,
                None,
                args.lookback_days,
                Vec::new(),
                CancellationToken::new(),
            )
            .await?;
        info!(
            run_id = %run.run_id,
            status = run.status.as_str(),
            checked = run.metrics.checked,
            added = run.metrics.added,
            updated = run.metrics.updated,
            errors = run.metrics.errors,
            "Single run finished"
        );
        return Ok(());
    }

    let _scheduler = scheduler::start(engine.clone(), db_pool.clone()).await?;

    let state = AppState::new(db_pool, event_bus, engine);
    let app = lgw_sync::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!("Listening on http://127.0.0.1:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
