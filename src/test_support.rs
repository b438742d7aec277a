use std::sync::Arc;
use std::time::Duration;

use crate::config::CoreConfig;
use crate::db;
use crate::services::applier::IngestService;
use crate::services::cache::ReadCache;
use crate::services::correlation::CorrelationEngine;
use crate::services::queue::{QueuePolicy, TelemetryQueue};
use crate::services::store::memory::MemoryTelemetryStore;
use crate::services::store::TelemetryStore;
use crate::state::AppState;

pub fn test_config() -> CoreConfig {
    CoreConfig {
        database_url: "postgresql://postgres@localhost/postgres".to_string(),
        queue_enabled: true,
        cache_enabled: true,
        ingest_workers: 2,
        queue_capacity: 100,
        job_max_attempts: 3,
        retry_base_delay_ms: 1_000,
        job_timeout_seconds: 30,
        failed_retention_hours: 24,
        completed_retention_seconds: 3_600,
        completed_retention_cap: 1_000,
        correlation_drift_seconds: 30,
        performance_window_hours: 24,
        current_cache_ttl_seconds: 60,
        performance_cache_ttl_seconds: 300,
        scan_limit: 10_000,
        partition_maintenance_interval_seconds: 3_600,
    }
}

/// AppState backed by the in-memory store; the pool is lazy and never
/// connected, so no test here touches a live database.
pub fn test_state() -> AppState {
    let config = test_config();
    let pool = db::connect_lazy(&config.database_url).expect("connect_lazy");

    let store: Arc<dyn TelemetryStore> = Arc::new(MemoryTelemetryStore::new());
    let cache = Arc::new(ReadCache::new(
        config.cache_enabled,
        Duration::from_secs(config.current_cache_ttl_seconds),
        Duration::from_secs(config.performance_cache_ttl_seconds),
    ));
    let queue = Arc::new(TelemetryQueue::new(QueuePolicy::from_config(&config)));
    let ingest = Arc::new(IngestService::new(
        queue,
        store.clone(),
        cache.clone(),
        config.queue_enabled,
        config.ingest_workers,
        Duration::from_secs(config.job_timeout_seconds),
    ));
    let correlation = Arc::new(CorrelationEngine::new(
        store.clone(),
        cache.clone(),
        config.correlation_drift_seconds,
        config.scan_limit,
    ));

    AppState {
        config,
        db: pool,
        store,
        ingest,
        correlation,
        cache,
    }
}
