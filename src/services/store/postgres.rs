use super::{MeterHistoryRow, MeterStateRow, TelemetryStore, VehicleHistoryRow, VehicleStateRow};
use crate::telemetry::{MeterReading, TelemetryRecord, VehicleReading};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Postgres-backed store. History tables are range-partitioned by
/// `reported_at`, so windowed scans only touch the overlapping partitions; the
/// `(device_id, reported_at DESC)` index drives the per-device ordering.
pub struct PgTelemetryStore {
    pool: PgPool,
}

impl PgTelemetryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_meter_current(&self, reading: &MeterReading) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meter_current (device_id, kwh_consumed_ac, voltage, reported_at, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (device_id)
            DO UPDATE SET
                kwh_consumed_ac = EXCLUDED.kwh_consumed_ac,
                voltage = EXCLUDED.voltage,
                reported_at = EXCLUDED.reported_at,
                updated_at = now()
            WHERE meter_current.reported_at <= EXCLUDED.reported_at
            "#,
        )
        .bind(&reading.device_id)
        .bind(reading.kwh_consumed_ac)
        .bind(reading.voltage)
        .bind(reading.reported_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert meter current state {}", reading.device_id))?;
        Ok(())
    }

    async fn upsert_vehicle_current(&self, reading: &VehicleReading) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicle_current (device_id, soc, kwh_delivered_dc, battery_temp, reported_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (device_id)
            DO UPDATE SET
                soc = EXCLUDED.soc,
                kwh_delivered_dc = EXCLUDED.kwh_delivered_dc,
                battery_temp = EXCLUDED.battery_temp,
                reported_at = EXCLUDED.reported_at,
                updated_at = now()
            WHERE vehicle_current.reported_at <= EXCLUDED.reported_at
            "#,
        )
        .bind(&reading.device_id)
        .bind(reading.soc)
        .bind(reading.kwh_delivered_dc)
        .bind(reading.battery_temp)
        .bind(reading.reported_at)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to upsert vehicle current state {}",
                reading.device_id
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for PgTelemetryStore {
    async fn upsert_current(&self, record: &TelemetryRecord) -> Result<()> {
        match record {
            TelemetryRecord::Meter(reading) => self.upsert_meter_current(reading).await,
            TelemetryRecord::Vehicle(reading) => self.upsert_vehicle_current(reading).await,
        }
    }

    async fn append_history(&self, record: &TelemetryRecord) -> Result<()> {
        match record {
            TelemetryRecord::Meter(reading) => {
                sqlx::query(
                    r#"
                    INSERT INTO meter_history (device_id, kwh_consumed_ac, voltage, reported_at)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(&reading.device_id)
                .bind(reading.kwh_consumed_ac)
                .bind(reading.voltage)
                .bind(reading.reported_at)
                .execute(&self.pool)
                .await
                .with_context(|| {
                    format!("failed to append meter history {}", reading.device_id)
                })?;
            }
            TelemetryRecord::Vehicle(reading) => {
                sqlx::query(
                    r#"
                    INSERT INTO vehicle_history (device_id, soc, kwh_delivered_dc, battery_temp, reported_at)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(&reading.device_id)
                .bind(reading.soc)
                .bind(reading.kwh_delivered_dc)
                .bind(reading.battery_temp)
                .bind(reading.reported_at)
                .execute(&self.pool)
                .await
                .with_context(|| {
                    format!("failed to append vehicle history {}", reading.device_id)
                })?;
            }
        }
        Ok(())
    }

    async fn current_meter(&self, device_id: &str) -> Result<Option<MeterStateRow>> {
        let row = sqlx::query_as::<_, MeterStateRow>(
            r#"
            SELECT device_id, kwh_consumed_ac, voltage, reported_at, updated_at
            FROM meter_current
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load meter current state {device_id}"))?;
        Ok(row)
    }

    async fn current_vehicle(&self, device_id: &str) -> Result<Option<VehicleStateRow>> {
        let row = sqlx::query_as::<_, VehicleStateRow>(
            r#"
            SELECT device_id, soc, kwh_delivered_dc, battery_temp, reported_at, updated_at
            FROM vehicle_current
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load vehicle current state {device_id}"))?;
        Ok(row)
    }

    async fn scan_meter_history(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MeterHistoryRow>> {
        let rows = sqlx::query_as::<_, MeterHistoryRow>(
            r#"
            SELECT id, device_id, kwh_consumed_ac, voltage, reported_at
            FROM meter_history
            WHERE device_id = $1 AND reported_at >= $2 AND reported_at <= $3
            ORDER BY reported_at DESC
            LIMIT $4
            "#,
        )
        .bind(device_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to scan meter history {device_id}"))?;
        Ok(rows)
    }

    async fn scan_vehicle_history(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VehicleHistoryRow>> {
        let rows = sqlx::query_as::<_, VehicleHistoryRow>(
            r#"
            SELECT id, device_id, soc, kwh_delivered_dc, battery_temp, reported_at
            FROM vehicle_history
            WHERE device_id = $1 AND reported_at >= $2 AND reported_at <= $3
            ORDER BY reported_at DESC
            LIMIT $4
            "#,
        )
        .bind(device_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to scan vehicle history {device_id}"))?;
        Ok(rows)
    }
}
