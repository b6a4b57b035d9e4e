//! Simulated physical state of one turbine.

use crate::config::TurbineSpec;
use crate::types::{unix_now, MetricRecord, OperationalStatus, RepairRequest, TurbineId};

/// A status change the turbine's lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("turbine {turbine_id}: invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub turbine_id: TurbineId,
    pub from: OperationalStatus,
    pub to: OperationalStatus,
}

/// Mutable state owned by a single turbine agent.
#[derive(Debug, Clone, PartialEq)]
pub struct TurbineState {
    pub id: TurbineId,
    pub wind_speed: f64,
    pub power_output_kwh: f64,
    pub status: OperationalStatus,
    /// Seconds since start or since the last completed repair.
    pub elapsed_secs: f64,
    pub upload_interval_secs: f64,
    pub time_to_fail_secs: f64,
    pub time_to_repair_secs: f64,
    /// An Ok record has been delivered since start or the last repair.
    /// A turbine cannot fail before the monitor has seen it running.
    ok_reported: bool,
}

impl TurbineState {
    pub fn from_spec(spec: &TurbineSpec) -> Self {
        Self {
            id: spec.id,
            wind_speed: spec.wind_speed,
            power_output_kwh: spec.power_output_kwh,
            status: OperationalStatus::Ok,
            elapsed_secs: 0.0,
            upload_interval_secs: spec.upload_interval_secs,
            time_to_fail_secs: spec.time_to_fail_secs,
            time_to_repair_secs: spec.time_to_repair_secs,
            ok_reported: false,
        }
    }

    /// Telemetry sample of the current state.
    pub fn snapshot(&self) -> MetricRecord {
        MetricRecord {
            turbine_id: self.id,
            wind_speed: self.wind_speed,
            power_output_kwh: self.power_output_kwh,
            status: self.status,
            timestamp: unix_now(),
        }
    }

    pub fn repair_request(&self) -> RepairRequest {
        RepairRequest {
            turbine_id: self.id,
            wind_speed: self.wind_speed,
            power_output_kwh: self.power_output_kwh,
            status: self.status,
            timestamp: unix_now(),
        }
    }

    /// Note that `record` reached the monitor.
    pub fn mark_delivered(&mut self, record: &MetricRecord) {
        if record.status == OperationalStatus::Ok && self.status == OperationalStatus::Ok {
            self.ok_reported = true;
        }
    }

    /// Advance simulated time by one tick. Returns `true` if the turbine
    /// broke down on this tick.
    pub fn advance(&mut self, dt_secs: f64) -> Result<bool, TransitionError> {
        self.elapsed_secs += dt_secs;
        if self.status == OperationalStatus::Ok
            && self.ok_reported
            && self.elapsed_secs >= self.time_to_fail_secs
        {
            self.transition(OperationalStatus::Broken)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Broken -> Ok, with the clock reset. `fresh_readings` replaces wind
    /// speed and power output when given.
    pub fn complete_repair(&mut self, fresh_readings: Option<(f64, f64)>) -> Result<(), TransitionError> {
        self.transition(OperationalStatus::Ok)?;
        self.elapsed_secs = 0.0;
        self.ok_reported = false;
        if let Some((wind_speed, power_output_kwh)) = fresh_readings {
            self.wind_speed = wind_speed;
            self.power_output_kwh = power_output_kwh;
        }
        Ok(())
    }

    /// Only Ok -> Broken and Broken -> Ok are legal.
    pub fn transition(&mut self, to: OperationalStatus) -> Result<(), TransitionError> {
        if self.status == to {
            return Err(TransitionError {
                turbine_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
