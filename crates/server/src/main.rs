use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ingest_core::{
    config::LOG_FILE_NAME, load_config, run_housekeeping, validate_config, verify_environment,
    ArtCliProcessor, Config, FfmpegTranscoder, IngestOrchestrator, LockManager,
    OrchestratorConfig, PipelineConfig, PipelineRunner, StatusSnapshot, StatusStore,
};
use ingest_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("ingestd: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stdout and to `{logs}/ingest_engine.log`.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(config: &Config) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.paths.logs)
        .with_context(|| format!("Failed to create log folder {:?}", config.paths.logs))?;

    let file_appender = tracing_appender::rolling::never(&config.paths.logs, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("INGEST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let _log_guard = init_logging(&config)?;
    info!("Starting ingest engine v{}", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Nothing may touch the managed folders before the lock is held.
    let lock = LockManager::acquire(&config.paths.lock_file)
        .context("Failed to acquire instance lock")?;

    verify_environment(&config).context("Environment check failed")?;
    info!("Environment verified");

    let report = run_housekeeping(&config).await;
    if !report.removed_intermediates.is_empty() || !report.stranded_files.is_empty() {
        info!(
            removed = report.removed_intermediates.len(),
            stranded = report.stranded_files.len(),
            "Housekeeping finished"
        );
    }

    // Status store
    let store = Arc::new(StatusStore::open(
        &config.paths.status_file,
        &config.paths.history_file,
    ));
    if let Err(e) = store.publish(StatusSnapshot::idle(Utc::now())) {
        error!("Failed to write initial status: {}", e);
    }
    info!("Status store initialized");

    // Pipeline and orchestrator
    let runner = PipelineRunner::new(
        PipelineConfig::from_config(&config),
        ArtCliProcessor::from_config(&config),
        FfmpegTranscoder::from_config(&config),
    );
    let orchestrator = Arc::new(IngestOrchestrator::new(
        OrchestratorConfig::from_config(&config),
        runner,
        Arc::clone(&store),
    ));

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&store),
        orchestrator.control(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Only start processing once the API is reachable.
    orchestrator.start().await;

    // Run server with graceful shutdown
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Stopping orchestrator...");
    orchestrator.stop().await;
    info!("Orchestrator stopped");
    served.context("Server error")?;

    if let Err(e) = lock.release() {
        warn!("Failed to release instance lock: {}", e);
    }
    info!("Server shut down");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
