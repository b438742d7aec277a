use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    pub queue_enabled: bool,
    pub cache_enabled: bool,
    pub ingest_workers: usize,
    pub queue_capacity: usize,
    pub job_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub job_timeout_seconds: u64,
    pub failed_retention_hours: u64,
    pub completed_retention_seconds: u64,
    pub completed_retention_cap: usize,
    pub correlation_drift_seconds: i64,
    pub performance_window_hours: i64,
    pub current_cache_ttl_seconds: u64,
    pub performance_cache_ttl_seconds: u64,
    pub scan_limit: i64,
    pub partition_maintenance_interval_seconds: u64,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("CHARGE_DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("CHARGE_DATABASE_URL must be set for the telemetry core")?;

        let queue_enabled = env_bool("CHARGE_QUEUE_ENABLED", true);
        let cache_enabled = env_bool("CHARGE_CACHE_ENABLED", true);
        let ingest_workers = env_u64("CHARGE_INGEST_WORKERS", 10).clamp(1, 64) as usize;
        let queue_capacity = env_u64("CHARGE_QUEUE_CAPACITY", 10_000).clamp(1, 1_000_000) as usize;
        let job_max_attempts = env_u64("CHARGE_JOB_MAX_ATTEMPTS", 3).clamp(1, 10) as u32;
        let retry_base_delay_ms = env_u64("CHARGE_RETRY_BASE_DELAY_MS", 1_000).clamp(10, 60_000);
        let job_timeout_seconds = env_u64("CHARGE_JOB_TIMEOUT_SECONDS", 30).clamp(1, 600);
        let failed_retention_hours = env_u64("CHARGE_FAILED_RETENTION_HOURS", 24).clamp(1, 24 * 30);
        let completed_retention_seconds =
            env_u64("CHARGE_COMPLETED_RETENTION_SECONDS", 3_600).clamp(60, 24 * 3_600);
        let completed_retention_cap =
            env_u64("CHARGE_COMPLETED_RETENTION_CAP", 1_000).clamp(10, 100_000) as usize;
        let correlation_drift_seconds =
            env_u64("CHARGE_CORRELATION_DRIFT_SECONDS", 30).clamp(1, 3_600) as i64;
        let performance_window_hours =
            env_u64("CHARGE_PERFORMANCE_WINDOW_HOURS", 24).clamp(1, 24 * 365) as i64;
        let current_cache_ttl_seconds =
            env_u64("CHARGE_CURRENT_CACHE_TTL_SECONDS", 60).clamp(1, 3_600);
        let performance_cache_ttl_seconds =
            env_u64("CHARGE_PERFORMANCE_CACHE_TTL_SECONDS", 300).clamp(1, 24 * 3_600);
        let scan_limit = env_u64("CHARGE_SCAN_LIMIT", 10_000).clamp(100, 10_000_000) as i64;
        let partition_maintenance_interval_seconds =
            env_u64("CHARGE_PARTITION_MAINTENANCE_INTERVAL_SECONDS", 3_600).clamp(60, 24 * 3_600);

        Ok(Self {
            database_url,
            queue_enabled,
            cache_enabled,
            ingest_workers,
            queue_capacity,
            job_max_attempts,
            retry_base_delay_ms,
            job_timeout_seconds,
            failed_retention_hours,
            completed_retention_seconds,
            completed_retention_cap,
            correlation_drift_seconds,
            performance_window_hours,
            current_cache_ttl_seconds,
            performance_cache_ttl_seconds,
            scan_limit,
            partition_maintenance_interval_seconds,
        })
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
