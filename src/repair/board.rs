//! Repair board: per-turbine inboxes for engineer visits, plus the open
//! repair request each broken turbine has raised.
//!
//! Turbines register once at startup and report when they break down. An
//! engineer is only ever delivered to a turbine with an open report, and
//! delivery closes the report.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::dispatcher::{DispatchError, EngineerVisit};
use crate::types::{RepairRequest, TurbineId};

#[derive(Debug, Default)]
struct BoardInner {
    inboxes: HashMap<TurbineId, mpsc::UnboundedSender<EngineerVisit>>,
    reported: HashMap<TurbineId, RepairRequest>,
}

/// Shared handle to the repair board.
#[derive(Debug, Clone, Default)]
pub struct RepairBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl RepairBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the inbox for `turbine_id`. Registering again replaces the
    /// previous inbox, whose pending visits are then abandoned, and drops
    /// any open report.
    pub fn register(&self, turbine_id: TurbineId) -> RepairInbox {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if inner.inboxes.insert(turbine_id, tx).is_some() {
            debug!(turbine_id, "[RepairBoard] Replacing existing inbox");
        }
        inner.reported.remove(&turbine_id);
        RepairInbox { turbine_id, rx }
    }

    #[cfg(test)]
    pub fn is_registered(&self, turbine_id: TurbineId) -> bool {
        self.lock()
            .inboxes
            .get(&turbine_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// A turbine announces it is broken. Must happen before the turbine's
    /// first broken record is sent, so that the dispatch it triggers finds
    /// the report open.
    pub fn report(&self, request: RepairRequest) {
        info!(
            turbine_id = request.turbine_id,
            wind_speed = request.wind_speed,
            power_output_kwh = request.power_output_kwh,
            "[RepairBoard] Repair requested"
        );
        self.lock().reported.insert(request.turbine_id, request);
    }

    /// Requests raised by turbines and not yet answered by a visit.
    #[cfg(test)]
    pub fn pending_reports(&self) -> Vec<RepairRequest> {
        let mut pending: Vec<RepairRequest> = self.lock().reported.values().cloned().collect();
        pending.sort_by_key(|r| r.turbine_id);
        pending
    }

    /// Check that `turbine_id` can take an engineer right now.
    pub(crate) fn check_deliverable(&self, turbine_id: TurbineId) -> Result<(), DispatchError> {
        let inner = self.lock();
        if !inner.inboxes.get(&turbine_id).is_some_and(|tx| !tx.is_closed()) {
            return Err(DispatchError::UnknownTurbine(turbine_id));
        }
        if !inner.reported.contains_key(&turbine_id) {
            return Err(DispatchError::NotReported(turbine_id));
        }
        Ok(())
    }

    /// Deliver a visit to its turbine and close the turbine's report.
    ///
    /// Hands the visit back, with the reason, if the turbine is unknown,
    /// its inbox has been dropped, or it has no open report.
    pub(crate) fn send_engineer(&self, visit: EngineerVisit) -> Result<(), (EngineerVisit, DispatchError)> {
        let turbine_id = visit.turbine_id();
        let mut inner = self.lock();

        let Some(tx) = inner.inboxes.get(&turbine_id) else {
            return Err((visit, DispatchError::UnknownTurbine(turbine_id)));
        };
        if !inner.reported.contains_key(&turbine_id) {
            return Err((visit, DispatchError::NotReported(turbine_id)));
        }
        match tx.send(visit) {
            Ok(()) => {
                inner.reported.remove(&turbine_id);
                Ok(())
            }
            Err(mpsc::error::SendError(visit)) => {
                inner.inboxes.remove(&turbine_id);
                inner.reported.remove(&turbine_id);
                Err((visit, DispatchError::UnknownTurbine(turbine_id)))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A turbine's private end of the board.
#[derive(Debug)]
pub struct RepairInbox {
    turbine_id: TurbineId,
    rx: mpsc::UnboundedReceiver<EngineerVisit>,
}

impl RepairInbox {
    pub const fn turbine_id(&self) -> TurbineId {
        self.turbine_id
    }

    /// Wait for the next engineer. `None` once the board has dropped this
    /// turbine's sender.
    pub async fn recv(&mut self) -> Option<EngineerVisit> {
        self.rx.recv().await
    }
}
