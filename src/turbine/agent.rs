//! Turbine agent: the telemetry loop and the repair-wait loop of one
//! turbine, raced inside a single task.

use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{TransitionError, TurbineState};
use crate::config::TurbineSpec;
use crate::ingest::{TelemetryError, TelemetrySink};
use crate::repair::{RepairBoard, RepairInbox};
use crate::retry::{RetryExhausted, RetryPolicy};
use crate::types::{OperationalStatus, TurbineId};

/// Turbine agent errors
#[derive(Debug, thiserror::Error)]
pub enum TurbineError {
    #[error("telemetry delivery failed: {0}")]
    TelemetryExhausted(#[from] RetryExhausted<TelemetryError>),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("turbine {0}: repair inbox closed")]
    RepairChannelClosed(TurbineId),
}

/// Read-only view of a running turbine's state.
#[derive(Debug, Clone)]
pub struct TurbineHandle {
    state: Arc<RwLock<TurbineState>>,
}

impl TurbineHandle {
    pub async fn snapshot(&self) -> TurbineState {
        self.state.read().await.clone()
    }
}

/// One simulated turbine.
pub struct TurbineAgent {
    spec: TurbineSpec,
    state: Arc<RwLock<TurbineState>>,
    sink: Arc<dyn TelemetrySink>,
    board: RepairBoard,
    inbox: RepairInbox,
    retry: RetryPolicy,
}

impl TurbineAgent {
    /// Create the agent and register its repair inbox on `board`.
    pub fn new(
        spec: TurbineSpec,
        sink: Arc<dyn TelemetrySink>,
        board: RepairBoard,
        retry: RetryPolicy,
    ) -> Self {
        let inbox = board.register(spec.id);
        Self {
            state: Arc::new(RwLock::new(TurbineState::from_spec(&spec))),
            spec,
            sink,
            board,
            inbox,
            retry,
        }
    }

    pub const fn id(&self) -> TurbineId {
        self.spec.id
    }

    pub fn handle(&self) -> TurbineHandle {
        TurbineHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Run both loops until cancelled or one of them fails.
    ///
    /// Dropping the agent drops its inbox, so an engineer that is queued
    /// for or working on this turbine goes back to the pool.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TurbineError> {
        let Self {
            spec,
            state,
            sink,
            board,
            mut inbox,
            retry,
        } = self;
        let id = spec.id;

        info!(
            turbine_id = id,
            sink = sink.sink_name(),
            upload_interval_secs = spec.upload_interval_secs,
            time_to_fail_secs = spec.time_to_fail_secs,
            time_to_repair_secs = spec.time_to_repair_secs,
            "[Turbine {}] Started",
            id
        );

        let breakdown = Notify::new();
        let result = tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            r = telemetry_loop(&spec, &state, sink.as_ref(), &board, &retry, &breakdown) => r,
            r = repair_loop(&spec, &state, &mut inbox, &breakdown) => r,
        };

        match &result {
            Ok(()) => debug!(turbine_id = id, "[Turbine {}] Stopped", id),
            Err(e) => error!(turbine_id = id, error = %e, "[Turbine {}] Halted", id),
        }
        result
    }
}

/// Emit, sleep, advance. Never stops while the turbine is broken.
///
/// A breakdown is reported on the board before the first broken record
/// goes out, so the dispatch that record triggers always finds it.
async fn telemetry_loop(
    spec: &TurbineSpec,
    state: &RwLock<TurbineState>,
    sink: &dyn TelemetrySink,
    board: &RepairBoard,
    retry: &RetryPolicy,
    breakdown: &Notify,
) -> Result<(), TurbineError> {
    let interval = spec.upload_interval();
    loop {
        let record = state.read().await.snapshot();
        retry.run("telemetry send", || sink.send(&record)).await?;
        state.write().await.mark_delivered(&record);
        debug!(turbine_id = spec.id, status = %record.status, "[Turbine {}] Telemetry sent", spec.id);

        tokio::time::sleep(interval).await;

        let mut s = state.write().await;
        if s.advance(spec.upload_interval_secs)? {
            warn!(turbine_id = spec.id, "[Turbine {}] Broke down", spec.id);
            board.report(s.repair_request());
            breakdown.notify_one();
        }
        drop(s);
    }
}

/// Wait for a breakdown, wait for the engineer, repair.
async fn repair_loop(
    spec: &TurbineSpec,
    state: &RwLock<TurbineState>,
    inbox: &mut RepairInbox,
    breakdown: &Notify,
) -> Result<(), TurbineError> {
    let interval = spec.upload_interval();
    loop {
        if state.read().await.status == OperationalStatus::Ok {
            // Recheck every interval, or as soon as the telemetry loop
            // flags a breakdown.
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = breakdown.notified() => {}
            }
            continue;
        }

        let visit = inbox
            .recv()
            .await
            .ok_or(TurbineError::RepairChannelClosed(spec.id))?;
        info!(
            turbine_id = spec.id,
            queued_ms = visit.queued_for().as_millis() as u64,
            repair_secs = spec.time_to_repair_secs,
            "[Turbine {}] Engineer arrived",
            spec.id
        );

        tokio::time::sleep(spec.time_to_repair()).await;

        let dispatched = visit.request();
        let fresh = spec
            .refresh_readings_on_repair
            .then_some((dispatched.wind_speed, dispatched.power_output_kwh));
        // Reset and close the episode under the same lock, so no telemetry
        // from the repaired turbine is sent while the episode is still open.
        let mut s = state.write().await;
        s.complete_repair(fresh)?;
        let outcome = visit.finish();
        drop(s);

        info!(
            turbine_id = spec.id,
            repair_ms = outcome.repair_duration.as_millis() as u64,
            "[Turbine {}] Repaired",
            spec.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingestion_queue, QueueSink};
    use crate::repair::{repair_dispatcher, EngineerPool};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_emits_every_interval_until_broken() {
        let (tx, mut rx) = ingestion_queue();
        let board = RepairBoard::new();
        let agent = TurbineAgent::new(
            TurbineSpec::new(1, 1.0, 2.0, 3.0),
            Arc::new(QueueSink::new(tx)),
            board.clone(),
            RetryPolicy::no_retry(),
        );
        let handle = agent.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(agent.run(cancel.clone()));

        let statuses: Vec<OperationalStatus> = {
            let mut v = Vec::new();
            for _ in 0..4 {
                v.push(rx.recv().await.unwrap().status);
            }
            v
        };
        assert_eq!(
            statuses,
            vec![
                OperationalStatus::Ok,
                OperationalStatus::Ok,
                OperationalStatus::Broken,
                OperationalStatus::Broken
            ]
        );
        assert_eq!(handle.snapshot().await.status, OperationalStatus::Broken);

        // Reported once, not once per broken record.
        assert_eq!(board.pending_reports().len(), 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_visit_repairs_after_time_to_repair() {
        let (tx, mut rx) = ingestion_queue();
        let board = RepairBoard::new();
        let pool = EngineerPool::new(1);
        let (dispatcher, worker) = repair_dispatcher(pool.clone(), board.clone());
        let cancel = CancellationToken::new();
        tokio::spawn(worker.run(cancel.clone()));

        let agent = TurbineAgent::new(
            TurbineSpec::new(3, 0.7, 1.0, 3.0),
            Arc::new(QueueSink::new(tx)),
            board,
            RetryPolicy::no_retry(),
        );
        let handle = agent.handle();
        tokio::spawn(agent.run(cancel.clone()));

        while rx.recv().await.unwrap().status == OperationalStatus::Ok {}
        let ticket = dispatcher.dispatch(3, 10.0, 10.0).unwrap();
        let outcome = ticket.completion().await.unwrap();

        assert!(outcome.repair_duration >= Duration::from_secs(3));
        assert!(outcome.repair_duration < Duration::from_millis(3010));
        let s = handle.snapshot().await;
        assert_eq!(s.status, OperationalStatus::Ok);
        assert!(s.elapsed_secs.abs() < f64::EPSILON);
        assert_eq!(pool.available(), 1);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repair_applies_dispatched_readings() {
        let (tx, mut rx) = ingestion_queue();
        let board = RepairBoard::new();
        let (dispatcher, worker) = repair_dispatcher(EngineerPool::new(1), board.clone());
        let cancel = CancellationToken::new();
        tokio::spawn(worker.run(cancel.clone()));

        let mut spec = TurbineSpec::new(6, 0.7, 1.0, 2.0);
        spec.wind_speed = 5.0;
        spec.power_output_kwh = 50.0;
        spec.refresh_readings_on_repair = true;
        let agent = TurbineAgent::new(spec, Arc::new(QueueSink::new(tx)), board, RetryPolicy::no_retry());
        let handle = agent.handle();
        tokio::spawn(agent.run(cancel.clone()));

        while rx.recv().await.unwrap().status == OperationalStatus::Ok {}
        dispatcher.dispatch(6, 42.0, 420.0).unwrap().completion().await.unwrap();

        let s = handle.snapshot().await;
        assert_eq!(s.status, OperationalStatus::Ok);
        assert!((s.wind_speed - 42.0).abs() < f64::EPSILON);
        assert!((s.power_output_kwh - 420.0).abs() < f64::EPSILON);

        let next = loop {
            let record = rx.recv().await.unwrap();
            if record.status == OperationalStatus::Ok {
                break record;
            }
        };
        assert!((next.wind_speed - 42.0).abs() < f64::EPSILON);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakdown_reported_before_broken_record() {
        let (tx, mut rx) = ingestion_queue();
        let board = RepairBoard::new();
        let agent = TurbineAgent::new(
            TurbineSpec::new(7, 1.0, 1.0, 1.0),
            Arc::new(QueueSink::new(tx)),
            board.clone(),
            RetryPolicy::no_retry(),
        );
        let cancel = CancellationToken::new();
        tokio::spawn(agent.run(cancel.clone()));

        assert_eq!(rx.recv().await.unwrap().status, OperationalStatus::Ok);
        assert!(board.pending_reports().is_empty());
        assert_eq!(rx.recv().await.unwrap().status, OperationalStatus::Broken);
        let pending = board.pending_reports();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].turbine_id, 7);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_queue_halts_turbine() {
        let (tx, rx) = ingestion_queue();
        drop(rx);
        let agent = TurbineAgent::new(
            TurbineSpec::new(2, 1.0, 5.0, 1.0),
            Arc::new(QueueSink::new(tx)),
            RepairBoard::new(),
            RetryPolicy::default(),
        );

        let err = agent.run(CancellationToken::new()).await.unwrap_err();
        match err {
            TurbineError::TelemetryExhausted(e) => assert_eq!(e.attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
    }
}
