//! `tvarrd`: boots the operational spine (ingestion, proxy generation,
//! backup, daemon registry, relay sessions, scheduler + runner) and waits
//! for ctrl-c, cancelling every background task in turn.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tvarr_core::backup::{BackupEngine, FileDatabaseSnapshotter};
use tvarr_core::config::Config;
use tvarr_core::daemon::DaemonRegistry;
use tvarr_core::ingestor::{HandlerRegistry, IngestionCoordinator};
use tvarr_core::pipeline::ProxyOrchestrator;
use tvarr_core::progress::ProgressService;
use tvarr_core::relay::RelayManager;
use tvarr_core::repositories::{
    InMemoryChannelRepository, InMemoryJobRepository, InMemoryProxyRepository,
    InMemorySettingsRepository, InMemorySourceRepository,
};
use tvarr_core::scheduler::{CoreDispatcher, JobQueue, JobRunner, Scheduler};

#[derive(Parser)]
#[command(name = "tvarrd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IPTV aggregation core: ingestion, proxy generation, backup, relay")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("tvarr_core={},tvarrd={}", cli.log_level, cli.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_from_file(&cli.config)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting tvarrd");

    let sources = Arc::new(InMemorySourceRepository::default());
    let channels = Arc::new(InMemoryChannelRepository::default());
    let proxies = Arc::new(InMemoryProxyRepository::default());
    let jobs = Arc::new(InMemoryJobRepository::default());
    let settings = Arc::new(InMemorySettingsRepository::default());
    let progress = ProgressService::new();

    // Parsing M3U/Xtream/manual sources into channels is out of scope;
    // an empty registry means every ingest attempt fails fast with
    // ErrHandlerUnavailable until a real handler is registered here.
    let handlers = Arc::new(HandlerRegistry::new());
    let ingestion = Arc::new(IngestionCoordinator::new(
        sources.clone(),
        channels.clone(),
        handlers,
        progress.clone(),
    ));

    std::fs::create_dir_all(&config.pipeline.working_dir)?;
    let proxy_orchestrator = Arc::new(ProxyOrchestrator::new(
        proxies.clone(),
        channels.clone(),
        progress.clone(),
        config.pipeline.working_dir.clone(),
    ));

    std::fs::create_dir_all(&config.backup.directory)?;
    let live_db_path = PathBuf::from("database.db");
    let snapshotter = Arc::new(FileDatabaseSnapshotter::new(live_db_path));
    let backup = Arc::new(BackupEngine::new(config.backup.clone(), snapshotter, settings.clone()));

    let daemon_registry = Arc::new(DaemonRegistry::new(config.daemon.clone()));
    let _relay_manager = Arc::new(RelayManager::new(config.relay.clone(), daemon_registry.clone()));

    let queue = Arc::new(JobQueue::new());
    let mut scheduler = Scheduler::new(queue.clone(), jobs.clone());
    if config.backup.schedule.enabled {
        scheduler.add_schedule(tvarr_core::scheduler::ScheduleEntry {
            job_type: tvarr_core::models::JobType::Backup,
            target_id: uuid::Uuid::nil(),
            cron: config.backup.schedule.cron.clone(),
            priority: tvarr_core::scheduler::JobPriority::Maintenance,
        })?;
    }
    let scheduler = Arc::new(scheduler);

    let dispatcher = Arc::new(CoreDispatcher { ingestion, proxy_orchestrator, backup });
    let runner = Arc::new(JobRunner::new(queue, jobs, dispatcher, config.scheduler.global_concurrency));

    let cancel = tokio_util::sync::CancellationToken::new();

    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let tick = std::time::Duration::from_secs(config.scheduler.tick_interval_secs);
        async move { scheduler.run(tick, cancel).await }
    });
    let runner_handle = tokio::spawn({
        let runner = runner.clone();
        let cancel = cancel.clone();
        let tick = std::time::Duration::from_secs(config.scheduler.tick_interval_secs);
        async move { runner.run(tick, cancel).await }
    });
    let sweeper_handle = tokio::spawn({
        let registry = daemon_registry.clone();
        let cancel = cancel.clone();
        async move { registry.run_sweeper(cancel).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, cancelling background tasks");
    cancel.cancel();
    let _ = tokio::join!(scheduler_handle, runner_handle, sweeper_handle);

    Ok(())
}
