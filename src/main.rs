use anyhow::{Context, Result};
use charge_core_rs::{cli, config, db, routes, services, state};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind charge-core-rs listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind charge-core-rs listener on {addr}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::CoreConfig::from_env()?;
    let pool = db::connect_lazy(&config.database_url)?;
    db::run_migrations(&pool).await?;

    let store: Arc<dyn services::store::TelemetryStore> =
        Arc::new(services::store::postgres::PgTelemetryStore::new(pool.clone()));
    let cache = Arc::new(services::cache::ReadCache::new(
        config.cache_enabled,
        Duration::from_secs(config.current_cache_ttl_seconds),
        Duration::from_secs(config.performance_cache_ttl_seconds),
    ));
    let queue = Arc::new(services::queue::TelemetryQueue::new(
        services::queue::QueuePolicy::from_config(&config),
    ));
    let ingest = Arc::new(services::applier::IngestService::new(
        queue,
        store.clone(),
        cache.clone(),
        config.queue_enabled,
        config.ingest_workers,
        Duration::from_secs(config.job_timeout_seconds),
    ));
    let correlation = Arc::new(services::correlation::CorrelationEngine::new(
        store.clone(),
        cache.clone(),
        config.correlation_drift_seconds,
        config.scan_limit,
    ));

    let state = state::AppState {
        config: config.clone(),
        db: pool.clone(),
        store,
        ingest: ingest.clone(),
        correlation,
        cache,
    };

    if let Err(err) = services::partitions::ensure_upcoming_partitions(&pool).await {
        tracing::warn!("failed to pre-create history partitions: {err:#}");
    }

    let cancel = CancellationToken::new();
    ingest.start(cancel.clone());
    services::partitions::PartitionMaintainer::new(
        pool,
        Duration::from_secs(config.partition_maintenance_interval_seconds),
    )
    .start(cancel.clone());

    let app = routes::router(state).layer(CorsLayer::permissive());
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "charge-core-rs listening");
    axum::serve(listener, app).await?;
    cancel.cancel();
    Ok(())
}
