use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::monitor::MonitorReport;
use crate::repair::DispatchStats;
use crate::types::TurbineId;

/// Summary of one fleet run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetReport {
    pub turbines: u32,
    pub engineers: usize,
    pub records_ingested: u64,
    /// Accepted dispatches per turbine.
    pub dispatches: BTreeMap<TurbineId, u64>,
    pub repairs_completed: u64,
    pub repairs_abandoned: u64,
    /// Broken records ignored because the turbine had not reported a
    /// breakdown.
    pub unconfirmed_breakdowns: u64,
    #[serde(with = "millis")]
    pub longest_queue_wait: Duration,
    /// Turbines that halted with an error before shutdown.
    pub failed_turbines: Vec<TurbineId>,
}

impl FleetReport {
    pub(crate) fn assemble(
        turbines: u32,
        engineers: usize,
        monitor: Option<&MonitorReport>,
        stats: &DispatchStats,
        mut failed_turbines: Vec<TurbineId>,
    ) -> Self {
        failed_turbines.sort_unstable();
        Self {
            turbines,
            engineers,
            records_ingested: monitor.map_or(0, |m| m.records_ingested),
            dispatches: stats.dispatches(),
            repairs_completed: stats.completed(),
            repairs_abandoned: stats.abandoned(),
            unconfirmed_breakdowns: monitor.map_or(0, |m| m.unconfirmed_breakdowns),
            longest_queue_wait: stats.longest_queue_wait(),
            failed_turbines,
        }
    }

    pub fn total_dispatches(&self) -> u64 {
        self.dispatches.values().sum()
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
