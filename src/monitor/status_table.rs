use std::collections::HashMap;

use crate::types::{OperationalStatus, TurbineId};

/// Last observed status per turbine. Absent means the turbine has not been
/// seen yet.
#[derive(Debug, Clone, Default)]
pub struct LastStatusTable {
    statuses: HashMap<TurbineId, OperationalStatus>,
}

impl LastStatusTable {
    /// Record `status` for `turbine_id` and return what was there before.
    pub fn observe(&mut self, turbine_id: TurbineId, status: OperationalStatus) -> Option<OperationalStatus> {
        self.statuses.insert(turbine_id, status)
    }

    #[cfg(test)]
    pub fn get(&self, turbine_id: TurbineId) -> Option<OperationalStatus> {
        self.statuses.get(&turbine_id).copied()
    }

    /// Turbines seen so far.
    pub(crate) fn len(&self) -> usize {
        self.statuses.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Broken after Ok, or Broken on first sight.
    pub fn needs_dispatch(previous: Option<OperationalStatus>, current: OperationalStatus) -> bool {
        current.is_broken() && previous != Some(OperationalStatus::Broken)
    }
}
