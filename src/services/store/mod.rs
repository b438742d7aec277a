pub mod postgres;

#[cfg(test)]
pub mod memory;

use crate::telemetry::TelemetryRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest known meter reading for one device; overwritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MeterStateRow {
    pub device_id: String,
    pub kwh_consumed_ac: f64,
    pub voltage: f64,
    pub reported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Latest known vehicle reading for one device; overwritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct VehicleStateRow {
    pub device_id: String,
    pub soc: f64,
    pub kwh_delivered_dc: f64,
    pub battery_temp: f64,
    pub reported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable meter history row. Corrections are additional rows, never updates.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MeterHistoryRow {
    pub id: i64,
    pub device_id: String,
    pub kwh_consumed_ac: f64,
    pub voltage: f64,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct VehicleHistoryRow {
    pub id: i64,
    pub device_id: String,
    pub soc: f64,
    pub kwh_delivered_dc: f64,
    pub battery_temp: f64,
    pub reported_at: DateTime<Utc>,
}

/// Storage contract for the dual-write applier and the read paths.
///
/// `upsert_current` is atomic insert-or-replace keyed by device id and carries
/// a monotonic timestamp guard: a reading older than the stored row is ignored
/// (equal timestamps overwrite, so retried jobs land the same values).
/// `append_history` is a plain append and is NOT idempotent; retried jobs can
/// duplicate history rows, which reads must tolerate.
/// Scans return rows for one device within `[start, end]`, descending by
/// reported timestamp, at most `limit` rows.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn upsert_current(&self, record: &TelemetryRecord) -> Result<()>;
    async fn append_history(&self, record: &TelemetryRecord) -> Result<()>;

    async fn current_meter(&self, device_id: &str) -> Result<Option<MeterStateRow>>;
    async fn current_vehicle(&self, device_id: &str) -> Result<Option<VehicleStateRow>>;

    async fn scan_meter_history(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MeterHistoryRow>>;

    async fn scan_vehicle_history(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VehicleHistoryRow>>;
}
