use crate::services::cache::ReadCache;
use crate::services::store::{MeterHistoryRow, TelemetryStore, VehicleHistoryRow};
use crate::time::round2;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Aggregate charge-session efficiency over a trailing window. All numeric
/// fields are presentation-rounded to 2 decimal places.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub device_id: String,
    pub total_kwh_consumed_ac: f64,
    pub total_kwh_delivered_dc: f64,
    pub efficiency_ratio: f64,
    pub avg_battery_temp: f64,
    pub matched_pairs: u64,
}

/// Joins the two per-device history streams within a bounded clock-drift
/// tolerance. The scans are device- and window-bounded (partition pruning plus
/// the composite index), so the join never sees more than the trailing window.
pub struct CorrelationEngine {
    store: Arc<dyn TelemetryStore>,
    cache: Arc<ReadCache>,
    drift: Duration,
    scan_limit: i64,
}

impl CorrelationEngine {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        cache: Arc<ReadCache>,
        drift_seconds: i64,
        scan_limit: i64,
    ) -> Self {
        Self {
            store,
            cache,
            drift: Duration::seconds(drift_seconds),
            scan_limit,
        }
    }

    /// `None` means no correlated pair in the window; callers map it to
    /// NotFound. Storage faults surface as errors, never as "no data".
    pub async fn performance(
        &self,
        device_id: &str,
        window_hours: i64,
    ) -> Result<Option<PerformanceReport>> {
        if let Some(hit) = self.cache.get_performance(device_id, window_hours) {
            return Ok(Some(hit));
        }

        let end = Utc::now();
        let start = end - Duration::hours(window_hours);
        let (meter_rows, vehicle_rows) = tokio::try_join!(
            self.store
                .scan_meter_history(device_id, start, end, self.scan_limit),
            self.store
                .scan_vehicle_history(device_id, start, end, self.scan_limit),
        )?;

        let report = correlate(device_id, &meter_rows, &vehicle_rows, self.drift);
        if let Some(report) = report.clone() {
            self.cache.set_performance(device_id, window_hours, report);
        }
        Ok(report)
    }
}

/// Pair-wise join of the two streams: every (meter, vehicle) pair whose
/// timestamps lie within `drift` of each other contributes to the sums (naive
/// inner join; fan-out double-counting when devices report faster than the
/// drift window is an accepted approximation). Same-timestamp correction rows
/// are summed, not deduplicated. Input rows are descending by timestamp, as
/// the store scans return them.
pub fn correlate(
    device_id: &str,
    meter_rows: &[MeterHistoryRow],
    vehicle_rows: &[VehicleHistoryRow],
    drift: Duration,
) -> Option<PerformanceReport> {
    // Ascending views; the sweep advances the vehicle lower bound once per
    // meter row, so cost is linear in rows plus emitted pairs.
    let meters: Vec<&MeterHistoryRow> = meter_rows.iter().rev().collect();
    let vehicles: Vec<&VehicleHistoryRow> = vehicle_rows.iter().rev().collect();

    let mut consumed_sum = 0.0;
    let mut delivered_sum = 0.0;
    let mut temp_sum = 0.0;
    let mut pairs: u64 = 0;

    let mut lower = 0usize;
    for meter in &meters {
        let earliest = meter.reported_at - drift;
        let latest = meter.reported_at + drift;
        while lower < vehicles.len() && vehicles[lower].reported_at < earliest {
            lower += 1;
        }
        let mut idx = lower;
        while idx < vehicles.len() && vehicles[idx].reported_at <= latest {
            let vehicle = vehicles[idx];
            consumed_sum += meter.kwh_consumed_ac;
            delivered_sum += vehicle.kwh_delivered_dc;
            temp_sum += vehicle.battery_temp;
            pairs += 1;
            idx += 1;
        }
    }

    if pairs == 0 {
        return None;
    }

    let efficiency = if consumed_sum > 0.0 {
        delivered_sum / consumed_sum * 100.0
    } else {
        0.0
    };

    Some(PerformanceReport {
        device_id: device_id.to_string(),
        total_kwh_consumed_ac: round2(consumed_sum),
        total_kwh_delivered_dc: round2(delivered_sum),
        efficiency_ratio: round2(efficiency),
        avg_battery_temp: round2(temp_sum / pairs as f64),
        matched_pairs: pairs,
    })
}
