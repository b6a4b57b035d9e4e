//! Repair dispatch workflow.
//!
//! ```text
//! CentralMonitor ──dispatch()──▶ job queue (FIFO) ──▶ DispatchWorker
//!                                                        │ pool.acquire()
//!                                                        ▼
//!                                  RepairBoard ──EngineerVisit──▶ turbine inbox
//!                                                        │ visit.finish()
//!        DispatchTicket ◀──────── RepairOutcome ─────────┘
//! ```
//!
//! One worker task acquires engineers in dispatch order, so requests are
//! served FIFO when the pool is exhausted. The engineer stays with the
//! [`EngineerVisit`] until the turbine finishes the repair or the visit is
//! dropped; both paths return the engineer to the pool.
//!
//! Engineers only go to turbines that have reported a breakdown on the
//! [`RepairBoard`]. A broken record for a turbine that is still running is
//! refused with [`DispatchError::NotReported`] and holds nothing.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::board::RepairBoard;
use super::pool::{EngineerGuard, EngineerPool, PoolError};
use crate::types::{RepairRequest, TurbineId};

/// Dispatch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("turbine {0} already has a repair in flight")]
    DuplicateDispatch(TurbineId),
    #[error("turbine {0} is not registered for repairs")]
    UnknownTurbine(TurbineId),
    #[error("turbine {0} has not reported a breakdown")]
    NotReported(TurbineId),
    #[error("repair for turbine {0} was abandoned before completion")]
    Abandoned(TurbineId),
    #[error("repair dispatcher is not running")]
    DispatcherClosed,
}

/// Result of one completed repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOutcome {
    pub turbine_id: TurbineId,
    /// Time between dispatch and an engineer being assigned.
    pub queued_for: Duration,
    /// Time between the engineer being assigned and the turbine reporting Ok.
    pub repair_duration: Duration,
}

type Reply = oneshot::Sender<Result<RepairOutcome, DispatchError>>;

// ============================================================================
// Counters
// ============================================================================

/// Running totals shared between the dispatcher handle, worker and visits.
#[derive(Debug, Default)]
pub struct DispatchStats {
    per_turbine: Mutex<BTreeMap<TurbineId, u64>>,
    completed: AtomicU64,
    abandoned: AtomicU64,
    longest_wait_us: AtomicU64,
}

impl DispatchStats {
    /// Accepted dispatches, keyed by turbine.
    pub fn dispatches(&self) -> BTreeMap<TurbineId, u64> {
        self.per_turbine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total_dispatches(&self) -> u64 {
        self.dispatches().values().sum()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Longest time any request waited for a free engineer.
    pub fn longest_queue_wait(&self) -> Duration {
        Duration::from_micros(self.longest_wait_us.load(Ordering::Relaxed))
    }

    fn record_dispatch(&self, turbine_id: TurbineId) {
        *self
            .per_turbine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(turbine_id)
            .or_insert(0) += 1;
    }

    fn record_wait(&self, waited: Duration) {
        let us = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.longest_wait_us.fetch_max(us, Ordering::Relaxed);
    }
}

// ============================================================================
// In-flight bookkeeping
// ============================================================================

type InFlightSet = Arc<Mutex<HashSet<TurbineId>>>;

/// Marks a turbine as having an open repair episode until dropped.
#[derive(Debug)]
struct InFlightEntry {
    turbine_id: TurbineId,
    set: InFlightSet,
}

impl InFlightEntry {
    fn claim(set: &InFlightSet, turbine_id: TurbineId) -> Result<Self, DispatchError> {
        let mut guard = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.insert(turbine_id) {
            return Err(DispatchError::DuplicateDispatch(turbine_id));
        }
        Ok(Self {
            turbine_id,
            set: Arc::clone(set),
        })
    }
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.turbine_id);
    }
}

// ============================================================================
// Engineer visit
// ============================================================================

struct VisitCompletion {
    reply: Reply,
    engineer: EngineerGuard,
    in_flight: InFlightEntry,
    stats: Arc<DispatchStats>,
}

/// An engineer assigned to one broken turbine.
///
/// Call [`finish`](Self::finish) once the turbine is back to Ok. Dropping
/// an unfinished visit reports it as abandoned. Either way the engineer
/// returns to the pool.
pub struct EngineerVisit {
    request: RepairRequest,
    queued_for: Duration,
    assigned_at: Instant,
    completion: Option<VisitCompletion>,
}

impl std::fmt::Debug for EngineerVisit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineerVisit")
            .field("turbine_id", &self.request.turbine_id)
            .field("queued_for", &self.queued_for)
            .field("open", &self.completion.is_some())
            .finish()
    }
}

impl EngineerVisit {
    pub const fn turbine_id(&self) -> TurbineId {
        self.request.turbine_id
    }

    /// Readings the monitor attached when it dispatched this engineer.
    pub const fn request(&self) -> &RepairRequest {
        &self.request
    }

    pub const fn queued_for(&self) -> Duration {
        self.queued_for
    }

    /// Close the repair episode, resolve the ticket, release the engineer.
    pub fn finish(mut self) -> RepairOutcome {
        let outcome = RepairOutcome {
            turbine_id: self.turbine_id(),
            queued_for: self.queued_for,
            repair_duration: self.assigned_at.elapsed(),
        };
        if let Some(done) = self.completion.take() {
            let VisitCompletion {
                reply,
                engineer,
                in_flight,
                stats,
            } = done;
            // The episode must be closed before the turbine can report Ok
            // again, otherwise its next failure looks like a duplicate.
            drop(in_flight);
            stats.completed.fetch_add(1, Ordering::Relaxed);
            let _ = reply.send(Ok(outcome));
            drop(engineer);
        }
        outcome
    }

    fn reject(mut self, error: DispatchError) {
        if let Some(done) = self.completion.take() {
            let _ = done.reply.send(Err(error));
        }
    }
}

impl Drop for EngineerVisit {
    fn drop(&mut self) {
        if let Some(done) = self.completion.take() {
            warn!(
                turbine_id = self.request.turbine_id,
                "[Dispatcher] Engineer visit abandoned, releasing engineer"
            );
            done.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            let _ = done.reply.send(Err(DispatchError::Abandoned(self.request.turbine_id)));
        }
    }
}

// ============================================================================
// Dispatch handle and ticket
// ============================================================================

struct DispatchJob {
    request: RepairRequest,
    in_flight: InFlightEntry,
    reply: Reply,
    queued_at: Instant,
}

/// Resolves once the dispatched repair finishes or cannot proceed.
#[derive(Debug)]
pub struct DispatchTicket {
    turbine_id: TurbineId,
    rx: oneshot::Receiver<Result<RepairOutcome, DispatchError>>,
}

impl DispatchTicket {
    pub const fn turbine_id(&self) -> TurbineId {
        self.turbine_id
    }

    pub async fn completion(self) -> Result<RepairOutcome, DispatchError> {
        self.rx
            .await
            .unwrap_or(Err(DispatchError::Abandoned(self.turbine_id)))
    }
}

/// Cheap, cloneable entry point for requesting repairs.
#[derive(Debug, Clone)]
pub struct RepairDispatcher {
    jobs: mpsc::UnboundedSender<DispatchJob>,
    in_flight: InFlightSet,
    board: RepairBoard,
    stats: Arc<DispatchStats>,
}

impl DispatchJob {
    /// Refuse the job before an engineer is assigned.
    fn reject(self, error: DispatchError) {
        drop(self.in_flight);
        let _ = self.reply.send(Err(error));
    }
}

impl std::fmt::Debug for DispatchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchJob")
            .field("turbine_id", &self.request.turbine_id)
            .finish_non_exhaustive()
    }
}

/// Build the dispatcher handle and the worker that must be spawned to
/// serve it.
pub fn repair_dispatcher(pool: EngineerPool, board: RepairBoard) -> (RepairDispatcher, DispatchWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(DispatchStats::default());
    let handle = RepairDispatcher {
        jobs: tx,
        in_flight: InFlightSet::default(),
        board: board.clone(),
        stats: Arc::clone(&stats),
    };
    let worker = DispatchWorker {
        jobs: rx,
        pool,
        board,
        stats,
    };
    (handle, worker)
}

impl RepairDispatcher {
    /// Request an engineer for a broken turbine.
    ///
    /// Returns immediately; the ticket resolves when the repair is done.
    /// The turbine must have reported its breakdown on the board, and may
    /// have only one open repair episode at a time.
    pub fn dispatch(
        &self,
        turbine_id: TurbineId,
        wind_speed: f64,
        power_output_kwh: f64,
    ) -> Result<DispatchTicket, DispatchError> {
        self.board.check_deliverable(turbine_id)?;
        let in_flight = InFlightEntry::claim(&self.in_flight, turbine_id)?;

        let (reply, rx) = oneshot::channel();
        let job = DispatchJob {
            request: RepairRequest::broken(turbine_id, wind_speed, power_output_kwh),
            in_flight,
            reply,
            queued_at: Instant::now(),
        };
        self.jobs
            .send(job)
            .map_err(|_| DispatchError::DispatcherClosed)?;

        self.stats.record_dispatch(turbine_id);
        debug!(turbine_id, "[Dispatcher] Dispatch queued");
        Ok(DispatchTicket { turbine_id, rx })
    }

    /// Whether `turbine_id` has an open repair episode.
    #[cfg(test)]
    pub fn is_in_flight(&self, turbine_id: TurbineId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&turbine_id)
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Serves dispatch jobs one at a time, in order.
#[derive(Debug)]
pub struct DispatchWorker {
    jobs: mpsc::UnboundedReceiver<DispatchJob>,
    pool: EngineerPool,
    board: RepairBoard,
    stats: Arc<DispatchStats>,
}

impl DispatchWorker {
    /// Run until cancelled or every dispatcher handle is dropped.
    ///
    /// Pending jobs are dropped on exit; their tickets resolve as abandoned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PoolError> {
        info!(capacity = self.pool.capacity(), "[Dispatcher] Started");

        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let turbine_id = job.request.turbine_id;

            // The turbine may have gone away while the job was queued.
            if let Err(e) = self.board.check_deliverable(turbine_id) {
                warn!(turbine_id, error = %e, "[Dispatcher] Dropping dispatch before assigning an engineer");
                job.reject(e);
                continue;
            }

            if self.pool.available() == 0 {
                info!(
                    turbine_id,
                    "[Dispatcher] No engineers available. Waiting for one to become available."
                );
            }

            let engineer = tokio::select! {
                _ = cancel.cancelled() => break,
                engineer = self.pool.acquire() => engineer?,
            };
            self.pool.check_invariant()?;

            let queued_for = job.queued_at.elapsed();
            self.stats.record_wait(queued_for);

            let visit = EngineerVisit {
                request: job.request,
                queued_for,
                assigned_at: Instant::now(),
                completion: Some(VisitCompletion {
                    reply: job.reply,
                    engineer,
                    in_flight: job.in_flight,
                    stats: Arc::clone(&self.stats),
                }),
            };

            match self.board.send_engineer(visit) {
                Ok(()) => info!(
                    turbine_id,
                    queued_ms = queued_for.as_millis() as u64,
                    available = self.pool.available(),
                    "[Dispatcher] Engineer sent"
                ),
                Err((visit, e)) => {
                    warn!(turbine_id, error = %e, "[Dispatcher] Turbine not accepting engineers, visit cancelled");
                    visit.reject(e);
                }
            }
        }

        info!(
            completed = self.stats.completed(),
            abandoned = self.stats.abandoned(),
            "[Dispatcher] Stopped"
        );
        Ok(())
    }
}
