use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_VOLTAGE: f64 = 0.0;
pub const MAX_VOLTAGE: f64 = 500.0;
pub const MIN_SOC: f64 = 0.0;
pub const MAX_SOC: f64 = 100.0;
pub const MIN_BATTERY_TEMP: f64 = -20.0;
pub const MAX_BATTERY_TEMP: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Meter,
    Vehicle,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Meter => "meter",
            DeviceClass::Vehicle => "vehicle",
        }
    }

    pub const ALL: [DeviceClass; 2] = [DeviceClass::Meter, DeviceClass::Vehicle];
}

/// One grid-meter reading. `device_id` matches the paired vehicle's id for the
/// same physical charger (identifier-equality convention; no mapping table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub device_id: String,
    pub kwh_consumed_ac: f64,
    pub voltage: f64,
    pub reported_at: DateTime<Utc>,
}

/// One vehicle reading taken on the DC side of the same charger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleReading {
    pub device_id: String,
    pub soc: f64,
    pub kwh_delivered_dc: f64,
    pub battery_temp: f64,
    pub reported_at: DateTime<Utc>,
}

/// Tagged telemetry payload, exhaustive per device class at the applier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Meter(MeterReading),
    Vehicle(VehicleReading),
}

impl TelemetryRecord {
    pub fn class(&self) -> DeviceClass {
        match self {
            TelemetryRecord::Meter(_) => DeviceClass::Meter,
            TelemetryRecord::Vehicle(_) => DeviceClass::Vehicle,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            TelemetryRecord::Meter(reading) => &reading.device_id,
            TelemetryRecord::Vehicle(reading) => &reading.device_id,
        }
    }

    pub fn reported_at(&self) -> DateTime<Utc> {
        match self {
            TelemetryRecord::Meter(reading) => reading.reported_at,
            TelemetryRecord::Vehicle(reading) => reading.reported_at,
        }
    }

    /// Ingress range validation. The core downstream of this check assumes
    /// well-formed records.
    pub fn validate(&self) -> Result<(), String> {
        if self.device_id().trim().is_empty() {
            return Err("device_id must not be empty".to_string());
        }
        match self {
            TelemetryRecord::Meter(reading) => {
                if !reading.kwh_consumed_ac.is_finite() || reading.kwh_consumed_ac < 0.0 {
                    return Err("kwh_consumed_ac must be >= 0".to_string());
                }
                if !reading.voltage.is_finite()
                    || reading.voltage < MIN_VOLTAGE
                    || reading.voltage > MAX_VOLTAGE
                {
                    return Err(format!(
                        "voltage must be within [{MIN_VOLTAGE}, {MAX_VOLTAGE}]"
                    ));
                }
            }
            TelemetryRecord::Vehicle(reading) => {
                if !reading.soc.is_finite() || reading.soc < MIN_SOC || reading.soc > MAX_SOC {
                    return Err(format!("soc must be within [{MIN_SOC}, {MAX_SOC}]"));
                }
                if !reading.kwh_delivered_dc.is_finite() || reading.kwh_delivered_dc < 0.0 {
                    return Err("kwh_delivered_dc must be >= 0".to_string());
                }
                if !reading.battery_temp.is_finite()
                    || reading.battery_temp < MIN_BATTERY_TEMP
                    || reading.battery_temp > MAX_BATTERY_TEMP
                {
                    return Err(format!(
                        "battery_temp must be within [{MIN_BATTERY_TEMP}, {MAX_BATTERY_TEMP}]"
                    ));
                }
            }
        }
        Ok(())
    }
}
