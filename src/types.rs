//! Core data types shared by turbines, the ingestion path and the monitor.
//!
//! `MetricRecord` is also the wire body of the ingestion transport, so its
//! serde field names follow the external JSON contract:
//!
//! ```json
//! {"turbine_number": 3, "wind_speed": 41.2, "power_output_in_kwh": 1830.5,
//!  "operational_status": "ok", "timestamp": 1718000000.25}
//! ```

use serde::{Deserialize, Serialize};

/// Stable integer identity of a turbine.
pub type TurbineId = u32;

// ============================================================================
// Operational Status
// ============================================================================

/// Operational status of a turbine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalStatus {
    Ok,
    Broken,
}

impl OperationalStatus {
    pub const fn is_broken(self) -> bool {
        matches!(self, Self::Broken)
    }
}

impl std::fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Broken => write!(f, "broken"),
        }
    }
}

// ============================================================================
// Metric Record
// ============================================================================

/// One telemetry sample emitted by a turbine on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "turbine_number")]
    pub turbine_id: TurbineId,
    /// Wind speed in km/h
    pub wind_speed: f64,
    #[serde(rename = "power_output_in_kwh")]
    pub power_output_kwh: f64,
    #[serde(rename = "operational_status")]
    pub status: OperationalStatus,
    /// Unix seconds with sub-second precision
    pub timestamp: f64,
}

// ============================================================================
// Repair Request
// ============================================================================

/// "This turbine needs an engineer."
///
/// Produced by a turbine when it reports itself broken, and by the monitor
/// when it dispatches on an ok→broken edge (with freshly drawn readings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub turbine_id: TurbineId,
    pub wind_speed: f64,
    pub power_output_kwh: f64,
    pub status: OperationalStatus,
    pub timestamp: f64,
}

impl RepairRequest {
    /// Build a broken-status request stamped with the current time.
    pub fn broken(turbine_id: TurbineId, wind_speed: f64, power_output_kwh: f64) -> Self {
        Self {
            turbine_id,
            wind_speed,
            power_output_kwh,
            status: OperationalStatus::Broken,
            timestamp: unix_now(),
        }
    }
}

/// Current wall-clock time as fractional unix seconds.
pub fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp_micros() as f64 / 1_000_000.0
}
