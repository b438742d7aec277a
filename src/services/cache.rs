use crate::services::correlation::PerformanceReport;
use crate::services::store::{MeterStateRow, VehicleStateRow};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentStateEntry {
    pub meter: Option<MeterStateRow>,
    pub vehicle: Option<VehicleStateRow>,
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

/// Best-effort read-through cache for current-state lookups and performance
/// reports. Invalidated per device on every successful dual write. Disabled
/// mode always misses and ignores writes, so read results are identical with
/// the cache off; only latency differs.
pub struct ReadCache {
    enabled: bool,
    current_ttl: Duration,
    performance_ttl: Duration,
    current: Mutex<HashMap<String, Expiring<CurrentStateEntry>>>,
    // Keyed by device id + window so differently-sized queries never collide.
    performance: Mutex<HashMap<String, Expiring<PerformanceReport>>>,
}

impl ReadCache {
    pub fn new(enabled: bool, current_ttl: Duration, performance_ttl: Duration) -> Self {
        Self {
            enabled,
            current_ttl,
            performance_ttl,
            current: Mutex::new(HashMap::new()),
            performance: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO, Duration::ZERO)
    }

    fn performance_key(device_id: &str, window_hours: i64) -> String {
        format!("{device_id}:{window_hours}h")
    }

    pub fn get_current(&self, device_id: &str) -> Option<CurrentStateEntry> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.current.lock().expect("cache lock");
        match entries.get(device_id) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(device_id);
                None
            }
            None => None,
        }
    }

    pub fn set_current(&self, device_id: &str, value: CurrentStateEntry) {
        if !self.enabled {
            return;
        }
        let mut entries = self.current.lock().expect("cache lock");
        entries.insert(
            device_id.to_string(),
            Expiring {
                value,
                expires_at: Instant::now() + self.current_ttl,
            },
        );
    }

    pub fn get_performance(&self, device_id: &str, window_hours: i64) -> Option<PerformanceReport> {
        if !self.enabled {
            return None;
        }
        let key = Self::performance_key(device_id, window_hours);
        let now = Instant::now();
        let mut entries = self.performance.lock().expect("cache lock");
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn set_performance(&self, device_id: &str, window_hours: i64, value: PerformanceReport) {
        if !self.enabled {
            return;
        }
        let mut entries = self.performance.lock().expect("cache lock");
        entries.insert(
            Self::performance_key(device_id, window_hours),
            Expiring {
                value,
                expires_at: Instant::now() + self.performance_ttl,
            },
        );
    }

    /// Drop every cached entry for one device (all performance windows).
    pub fn invalidate_device(&self, device_id: &str) {
        if !self.enabled {
            return;
        }
        self.current.lock().expect("cache lock").remove(device_id);
        let prefix = format!("{device_id}:");
        self.performance
            .lock()
            .expect("cache lock")
            .retain(|key, _| !key.starts_with(&prefix));
    }
}
