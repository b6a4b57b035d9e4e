//! Central Monitor
//!
//! Single consumer of the ingestion queue. For every record:
//!
//! 1. Persist it (retried, then fatal)
//! 2. Update the last known status of the turbine
//! 3. On an ok→broken or unseen→broken edge, dispatch an engineer
//!
//! Repairs are tracked in their own tasks; ingestion never waits on one.

mod status_table;

pub use status_table::LastStatusTable;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{random_power_output, random_wind_speed};
use crate::ingest::IngestReceiver;
use crate::repair::{DispatchError, RepairDispatcher, RepairOutcome};
use crate::retry::{RetryExhausted, RetryPolicy};
use crate::storage::{MetricStore, StoreError};
use crate::types::{MetricRecord, TurbineId};

/// Monitor errors. Any of these stops the monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("metric persistence failed: {0}")]
    Store(#[from] RetryExhausted<StoreError>),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Totals for one monitor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub records_ingested: u64,
    pub dispatches: u64,
    pub repairs_completed: u64,
    pub repairs_failed: u64,
    /// Dispatches refused because the turbine is not part of this fleet.
    pub unknown_turbines: u64,
    /// Broken records from turbines that had not reported a breakdown.
    pub unconfirmed_breakdowns: u64,
    pub longest_queue_wait: Duration,
}

type RepairResult = (TurbineId, Result<RepairOutcome, DispatchError>);

/// Ingestion and dispatch loop.
pub struct CentralMonitor<S: MetricStore> {
    queue: IngestReceiver,
    store: S,
    dispatcher: RepairDispatcher,
    retry: RetryPolicy,
    last_status: LastStatusTable,
    rng: StdRng,
    report: MonitorReport,
}

impl<S: MetricStore> CentralMonitor<S> {
    pub fn new(queue: IngestReceiver, store: S, dispatcher: RepairDispatcher, retry: RetryPolicy) -> Self {
        Self {
            queue,
            store,
            dispatcher,
            retry,
            last_status: LastStatusTable::default(),
            rng: StdRng::from_entropy(),
            report: MonitorReport::default(),
        }
    }

    /// Seed the generator for dispatch readings.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Consume until cancelled or the queue closes.
    ///
    /// Repairs still in flight on exit are not waited for.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MonitorReport, MonitorError> {
        info!(store = self.store.backend_name(), "[Monitor] Started");
        let mut repairs: JoinSet<RepairResult> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Monitor] Shutdown requested");
                    break;
                }
                Some(joined) = repairs.join_next(), if !repairs.is_empty() => {
                    match joined {
                        Ok(result) => self.on_repair_finished(result),
                        Err(e) => warn!(error = %e, "[Monitor] Repair tracker task failed"),
                    }
                }
                record = self.queue.recv() => match record {
                    Some(record) => self.ingest(record, &mut repairs).await?,
                    None => {
                        info!("[Monitor] Ingestion queue closed");
                        break;
                    }
                },
            }
        }

        self.report.longest_queue_wait = self.dispatcher.stats().longest_queue_wait();
        info!(
            records = self.report.records_ingested,
            dispatches = self.report.dispatches,
            repairs_completed = self.report.repairs_completed,
            turbines_seen = self.last_status.len(),
            in_flight = repairs.len(),
            unprocessed = self.queue.backlog(),
            "[Monitor] Stopped"
        );
        Ok(self.report)
    }

    async fn ingest(
        &mut self,
        record: MetricRecord,
        repairs: &mut JoinSet<RepairResult>,
    ) -> Result<(), MonitorError> {
        self.report.records_ingested += 1;

        let store = &self.store;
        self.retry
            .run("metric persist", || store.append(record.turbine_id, &record))
            .await?;

        let turbine_id = record.turbine_id;
        let previous = self.last_status.observe(turbine_id, record.status);
        debug!(
            turbine_id,
            status = %record.status,
            previous = ?previous,
            "[Monitor] Record ingested"
        );

        if !LastStatusTable::needs_dispatch(previous, record.status) {
            return Ok(());
        }

        let wind_speed = random_wind_speed(&mut self.rng);
        let power_output_kwh = random_power_output(&mut self.rng);
        info!(turbine_id, "[Monitor] Turbine {} is broken, dispatching an engineer", turbine_id);

        match self.dispatcher.dispatch(turbine_id, wind_speed, power_output_kwh) {
            Ok(ticket) => {
                self.report.dispatches += 1;
                repairs.spawn(async move { (turbine_id, ticket.completion().await) });
                Ok(())
            }
            Err(DispatchError::UnknownTurbine(id)) => {
                warn!(turbine_id = id, "[Monitor] No such turbine in the fleet, not dispatching");
                self.report.unknown_turbines += 1;
                Ok(())
            }
            Err(DispatchError::NotReported(id)) => {
                warn!(turbine_id = id, "[Monitor] Turbine {} has not reported a breakdown, not dispatching", id);
                self.report.unconfirmed_breakdowns += 1;
                Ok(())
            }
            Err(e) => {
                error!(turbine_id, error = %e, "[Monitor] Dispatch invariant broken");
                Err(e.into())
            }
        }
    }

    fn on_repair_finished(&mut self, (turbine_id, result): RepairResult) {
        match result {
            Ok(outcome) => {
                self.report.repairs_completed += 1;
                info!(
                    turbine_id,
                    queued_ms = outcome.queued_for.as_millis() as u64,
                    repair_ms = outcome.repair_duration.as_millis() as u64,
                    "[Monitor] Turbine {} repaired",
                    turbine_id
                );
            }
            Err(e) => {
                self.report.repairs_failed += 1;
                warn!(turbine_id, error = %e, "[Monitor] Repair did not complete");
            }
        }
    }
}
