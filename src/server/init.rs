//! Server initialization and main run loop
//!
//! Warmup acquires process-wide resources in dependency order (rules
//! engine, configuration catalog, database pool, remote cache, write-back
//! queue) before any traffic is admitted, then serves the HTTP surface
//! with graceful shutdown. A warmup failure aborts startup; partial
//! startup is forbidden.

use super::loader::load_config;
use crate::api;
use anyhow::{Context, Result};
use loanflow_core::{
    Catalog, EvaluatorConfig, PgRecordStore, QuestionService, RecordStoreConfig, RedisStateStore,
    RedisStreamQueue, RulesEngine, StateCache, StateLoader, StateStore, SystemOfRecord,
    WritebackQueue,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the server.
pub async fn run() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    // ── Rules engine + configuration catalog ─────────────────────────
    let engine = Arc::new(RulesEngine::new());
    let catalog = Catalog::load(Path::new(&config.engine.config_root), &engine)
        .context("Failed to load question catalog")?;
    let catalog = Arc::new(catalog);
    info!(
        questions = catalog.question_count(),
        rules = engine.rule_count(),
        root = %config.engine.config_root,
        "catalog loaded and rules compiled"
    );

    // ── System of record ─────────────────────────────────────────────
    let record_config = RecordStoreConfig {
        host: config.database.host.clone(),
        port: config.database.port,
        user: config.database.user.clone(),
        password: config.database.password.clone(),
        database: config.database.database.clone(),
        pool_size: config.database.pool_size,
        query_timeout_ms: config.database.query_timeout_ms,
    };
    let record: Arc<dyn SystemOfRecord> = Arc::new(
        PgRecordStore::connect(&record_config)
            .await
            .context("Failed to connect to system of record")?,
    );
    info!(
        host = %config.database.host,
        database = %config.database.database,
        pool_size = config.database.pool_size,
        "system-of-record pool ready"
    );

    // ── Remote state cache ───────────────────────────────────────────
    let store = RedisStateStore::connect(
        &config.cache.url,
        Duration::from_millis(config.cache.op_timeout_ms),
    )
    .await
    .context("Failed to connect to remote state cache")?;
    if let Err(e) = store.ping().await {
        // Reads fall through to the loader, so a cold cache is degraded
        // but serviceable.
        warn!(error = %e, "remote cache not responding at startup");
    } else {
        info!("remote state cache ready");
    }
    let cache = Arc::new(StateCache::new(
        Arc::new(store),
        StateLoader::new(Arc::clone(&record)),
    ));

    // ── Write-back queue ─────────────────────────────────────────────
    let queue: Arc<dyn WritebackQueue> = Arc::new(
        RedisStreamQueue::connect(
            &config.queue.url,
            &config.queue.stream,
            Duration::from_millis(config.queue.publish_timeout_ms),
        )
        .await
        .context("Failed to connect to write-back queue")?,
    );
    info!(stream = %config.queue.stream, "write-back queue ready");

    // ── Service + HTTP surface ───────────────────────────────────────
    let service = Arc::new(QuestionService::new(
        catalog,
        engine,
        cache,
        queue,
        EvaluatorConfig::with_budget_ms(config.engine.budget_ms),
    ));

    let app = api::routes(service);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Loanflow shutdown complete");
    Ok(())
}

/// Shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
