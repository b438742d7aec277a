//! In-memory store double for unit tests. Mirrors the Postgres semantics:
//! guarded upsert, non-idempotent append, bounded descending window scans.

use super::{MeterHistoryRow, MeterStateRow, TelemetryStore, VehicleHistoryRow, VehicleStateRow};
use crate::telemetry::TelemetryRecord;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    meter_current: HashMap<String, MeterStateRow>,
    vehicle_current: HashMap<String, VehicleStateRow>,
    // Per-device history kept ascending by reported_at.
    meter_history: HashMap<String, Vec<MeterHistoryRow>>,
    vehicle_history: HashMap<String, Vec<VehicleHistoryRow>>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryTelemetryStore {
    inner: Mutex<Inner>,
    fail_current: AtomicBool,
    fail_history: AtomicBool,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next current-state upserts fail (partial dual-write simulation).
    pub fn set_fail_current(&self, fail: bool) {
        self.fail_current.store(fail, Ordering::SeqCst);
    }

    /// Make the next history appends fail (partial dual-write simulation).
    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn meter_history_len(&self, device_id: &str) -> usize {
        let inner = self.inner.lock().expect("store lock");
        inner
            .meter_history
            .get(device_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn vehicle_history_len(&self, device_id: &str) -> usize {
        let inner = self.inner.lock().expect("store lock");
        inner
            .vehicle_history
            .get(device_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn insert_sorted<T>(rows: &mut Vec<T>, row: T, ts: impl Fn(&T) -> DateTime<Utc>) {
    let at = ts(&row);
    if rows.last().map(|last| ts(last) <= at).unwrap_or(true) {
        rows.push(row);
        return;
    }
    let pos = rows.partition_point(|existing| ts(existing) <= at);
    rows.insert(pos, row);
}

fn scan_desc<T: Clone>(
    rows: Option<&Vec<T>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: i64,
    ts: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let Some(rows) = rows else {
        return Vec::new();
    };
    rows.iter()
        .rev()
        .filter(|row| {
            let at = ts(row);
            at >= start && at <= end
        })
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn upsert_current(&self, record: &TelemetryRecord) -> Result<()> {
        if self.fail_current.load(Ordering::SeqCst) {
            bail!("injected current-state failure");
        }
        let mut inner = self.inner.lock().expect("store lock");
        let now = Utc::now();
        match record {
            TelemetryRecord::Meter(reading) => {
                let entry = inner.meter_current.entry(reading.device_id.clone());
                let row = MeterStateRow {
                    device_id: reading.device_id.clone(),
                    kwh_consumed_ac: reading.kwh_consumed_ac,
                    voltage: reading.voltage,
                    reported_at: reading.reported_at,
                    updated_at: now,
                };
                entry
                    .and_modify(|existing| {
                        if existing.reported_at <= reading.reported_at {
                            *existing = row.clone();
                        }
                    })
                    .or_insert(row);
            }
            TelemetryRecord::Vehicle(reading) => {
                let entry = inner.vehicle_current.entry(reading.device_id.clone());
                let row = VehicleStateRow {
                    device_id: reading.device_id.clone(),
                    soc: reading.soc,
                    kwh_delivered_dc: reading.kwh_delivered_dc,
                    battery_temp: reading.battery_temp,
                    reported_at: reading.reported_at,
                    updated_at: now,
                };
                entry
                    .and_modify(|existing| {
                        if existing.reported_at <= reading.reported_at {
                            *existing = row.clone();
                        }
                    })
                    .or_insert(row);
            }
        }
        Ok(())
    }

    async fn append_history(&self, record: &TelemetryRecord) -> Result<()> {
        if self.fail_history.load(Ordering::SeqCst) {
            bail!("injected history failure");
        }
        let mut inner = self.inner.lock().expect("store lock");
        let id = inner.next_id();
        match record {
            TelemetryRecord::Meter(reading) => {
                let row = MeterHistoryRow {
                    id,
                    device_id: reading.device_id.clone(),
                    kwh_consumed_ac: reading.kwh_consumed_ac,
                    voltage: reading.voltage,
                    reported_at: reading.reported_at,
                };
                let rows = inner
                    .meter_history
                    .entry(reading.device_id.clone())
                    .or_default();
                insert_sorted(rows, row, |r| r.reported_at);
            }
            TelemetryRecord::Vehicle(reading) => {
                let row = VehicleHistoryRow {
                    id,
                    device_id: reading.device_id.clone(),
                    soc: reading.soc,
                    kwh_delivered_dc: reading.kwh_delivered_dc,
                    battery_temp: reading.battery_temp,
                    reported_at: reading.reported_at,
                };
                let rows = inner
                    .vehicle_history
                    .entry(reading.device_id.clone())
                    .or_default();
                insert_sorted(rows, row, |r| r.reported_at);
            }
        }
        Ok(())
    }

    async fn current_meter(&self, device_id: &str) -> Result<Option<MeterStateRow>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.meter_current.get(device_id).cloned())
    }

    async fn current_vehicle(&self, device_id: &str) -> Result<Option<VehicleStateRow>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.vehicle_current.get(device_id).cloned())
    }

    async fn scan_meter_history(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MeterHistoryRow>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(scan_desc(
            inner.meter_history.get(device_id),
            start,
            end,
            limit,
            |r| r.reported_at,
        ))
    }

    async fn scan_vehicle_history(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VehicleHistoryRow>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(scan_desc(
            inner.vehicle_history.get(device_id),
            start,
            end,
            limit,
            |r| r.reported_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{MeterReading, VehicleReading};
    use chrono::{Duration, TimeZone};

    fn meter_at(ts: DateTime<Utc>, kwh: f64) -> TelemetryRecord {
        TelemetryRecord::Meter(MeterReading {
            device_id: "CP-001".to_string(),
            kwh_consumed_ac: kwh,
            voltage: 230.0,
            reported_at: ts,
        })
    }

    fn base_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn append_then_scan_returns_row_exactly_once() {
        let store = MemoryTelemetryStore::new();
        let ts = base_ts();
        store.append_history(&meter_at(ts, 10.0)).await.unwrap();

        let rows = store
            .scan_meter_history("CP-001", ts - Duration::hours(1), ts + Duration::hours(1), 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kwh_consumed_ac, 10.0);
    }

    #[tokio::test]
    async fn window_spanning_day_boundary_merges_descending() {
        // One row on each side of a daily partition boundary.
        let store = MemoryTelemetryStore::new();
        let boundary = Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap();
        let before = boundary - Duration::minutes(5);
        let after = boundary + Duration::minutes(5);
        store.append_history(&meter_at(before, 1.0)).await.unwrap();
        store.append_history(&meter_at(after, 2.0)).await.unwrap();

        let rows = store
            .scan_meter_history(
                "CP-001",
                boundary - Duration::hours(1),
                boundary + Duration::hours(1),
                100,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reported_at, after);
        assert_eq!(rows[1].reported_at, before);
    }

    #[tokio::test]
    async fn scan_respects_bounds_and_limit() {
        let store = MemoryTelemetryStore::new();
        let ts = base_ts();
        for idx in 0..5 {
            store
                .append_history(&meter_at(ts + Duration::seconds(idx), idx as f64))
                .await
                .unwrap();
        }

        let rows = store
            .scan_meter_history("CP-001", ts, ts + Duration::seconds(10), 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        // Limit keeps the newest rows first.
        assert_eq!(rows[0].kwh_consumed_ac, 4.0);
        assert_eq!(rows[1].kwh_consumed_ac, 3.0);

        let rows = store
            .scan_meter_history("CP-001", ts + Duration::seconds(10), ts + Duration::seconds(20), 100)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn upsert_guard_ignores_older_reading() {
        let store = MemoryTelemetryStore::new();
        let ts = base_ts();
        store.upsert_current(&meter_at(ts, 10.0)).await.unwrap();
        store
            .upsert_current(&meter_at(ts - Duration::seconds(30), 99.0))
            .await
            .unwrap();

        let current = store.current_meter("CP-001").await.unwrap().unwrap();
        assert_eq!(current.kwh_consumed_ac, 10.0);
        assert_eq!(current.reported_at, ts);

        // Equal timestamp still overwrites (retry lands the same values).
        store.upsert_current(&meter_at(ts, 11.0)).await.unwrap();
        let current = store.current_meter("CP-001").await.unwrap().unwrap();
        assert_eq!(current.kwh_consumed_ac, 11.0);
    }

    #[tokio::test]
    async fn vehicle_current_is_independent_of_meter_current() {
        let store = MemoryTelemetryStore::new();
        let ts = base_ts();
        store
            .upsert_current(&TelemetryRecord::Vehicle(VehicleReading {
                device_id: "CP-001".to_string(),
                soc: 80.0,
                kwh_delivered_dc: 9.0,
                battery_temp: 28.0,
                reported_at: ts,
            }))
            .await
            .unwrap();

        assert!(store.current_meter("CP-001").await.unwrap().is_none());
        let vehicle = store.current_vehicle("CP-001").await.unwrap().unwrap();
        assert_eq!(vehicle.soc, 80.0);
    }
}
