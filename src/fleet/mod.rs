//! Fleet Supervisor
//!
//! Wires the components together and supervises them:
//!
//! ```text
//! TurbineAgent x N ──▶ ingestion queue ──▶ CentralMonitor ──▶ RepairDispatcher
//!        ▲                   ▲ (http mode)                          │
//!        │              axum /post_metrics                          │
//!        └──────────── RepairBoard ◀──── EngineerPool ◀─────────────┘
//! ```
//!
//! A turbine that fails halts alone. The monitor, dispatcher or HTTP server
//! failing brings the whole fleet down. Cancellation is a clean stop.

mod report;

pub use report::FleetReport;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api;
use crate::config::{ConfigError, FleetConfig, TransportKind, TurbineSpec};
use crate::ingest::{ingestion_queue, HttpSink, QueueSink, TelemetryError, TelemetrySink};
use crate::monitor::{CentralMonitor, MonitorError, MonitorReport};
use crate::repair::{repair_dispatcher, EngineerPool, PoolError, RepairBoard};
use crate::storage::MetricStore;
use crate::turbine::{TurbineAgent, TurbineError};
use crate::types::TurbineId;

/// Fleet errors
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("invalid turbine: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry setup failed: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to bind ingestion server on {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("ingestion server failed: {0}")]
    Server(std::io::Error),
    #[error("monitor failed: {0}")]
    Monitor(#[from] MonitorError),
    #[error("engineer pool failed: {0}")]
    Pool(#[from] PoolError),
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// What a supervised task returned.
enum TaskExit {
    Monitor(Result<MonitorReport, MonitorError>),
    Dispatcher(Result<(), PoolError>),
    Server(std::io::Result<()>),
    Turbine(TurbineId, Result<(), TurbineError>),
}

/// The whole simulation: turbines, monitor, dispatcher and engineers.
pub struct Fleet {
    config: FleetConfig,
    store: Arc<dyn MetricStore>,
    specs: Option<Vec<TurbineSpec>>,
}

impl Fleet {
    pub fn new(config: FleetConfig, store: Arc<dyn MetricStore>) -> Self {
        Self {
            config,
            store,
            specs: None,
        }
    }

    /// Use these turbines instead of drawing them from the config.
    #[must_use]
    pub fn with_turbines(mut self, specs: Vec<TurbineSpec>) -> Self {
        self.specs = Some(specs);
        self
    }

    /// Run until `cancel` fires or a fleet-fatal error occurs.
    pub async fn run(self, cancel: CancellationToken) -> Result<FleetReport, FleetError> {
        let Self { config, store, specs } = self;

        let mut rng = config
            .fleet
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let specs = specs.unwrap_or_else(|| config.turbine_specs(&mut rng));
        for spec in &specs {
            spec.validate()?;
        }
        let turbine_count = u32::try_from(specs.len()).unwrap_or(u32::MAX);
        let retry = config.retry_policy();

        // Child token: a fatal failure stops the fleet without cancelling
        // the caller's token.
        let cancel = cancel.child_token();
        let mut tasks: JoinSet<TaskExit> = JoinSet::new();

        let (queue_tx, queue_rx) = ingestion_queue();
        let pool = EngineerPool::new(config.fleet.engineer_count);
        let board = RepairBoard::new();
        let (dispatcher, worker) = repair_dispatcher(pool.clone(), board.clone());
        let stats = dispatcher.stats();

        info!(
            turbines = turbine_count,
            engineers = pool.capacity(),
            transport = ?config.telemetry.transport,
            store = store.backend_name(),
            "[Fleet] Starting"
        );

        let sink: Arc<dyn TelemetrySink> = match config.telemetry.transport {
            TransportKind::Channel => Arc::new(QueueSink::new(queue_tx.clone())),
            TransportKind::Http => {
                let addr = config.telemetry.bind_addr.clone();
                let listener = tokio::net::TcpListener::bind(&addr)
                    .await
                    .map_err(|e| FleetError::Bind(addr.clone(), e))?;
                let server_cancel = cancel.clone();
                let server_queue = queue_tx.clone();
                tasks.spawn(async move {
                    TaskExit::Server(api::serve(listener, server_queue, server_cancel).await)
                });
                Arc::new(HttpSink::new(
                    &config.telemetry.monitor_url,
                    Duration::from_secs(config.telemetry.timeout_secs),
                )?)
            }
        };
        // Only sinks and the server keep the queue open from here on.
        drop(queue_tx);

        let worker_cancel = cancel.clone();
        tasks.spawn(async move { TaskExit::Dispatcher(worker.run(worker_cancel).await) });

        let monitor = CentralMonitor::new(queue_rx, Arc::clone(&store), dispatcher, retry)
            .with_seed(rng.gen());
        let monitor_cancel = cancel.clone();
        tasks.spawn(async move { TaskExit::Monitor(monitor.run(monitor_cancel).await) });

        for spec in specs {
            let id = spec.id;
            let agent = TurbineAgent::new(spec, Arc::clone(&sink), board.clone(), retry);
            let turbine_cancel = cancel.clone();
            tasks.spawn(async move { TaskExit::Turbine(id, agent.run(turbine_cancel).await) });
        }
        drop(sink);

        info!("🔒 [Fleet] All tasks spawned, supervising...");
        let (monitor_report, failed_turbines, fatal) = supervise(&mut tasks, &cancel).await;

        pool.check_quiescent()?;
        let report = FleetReport::assemble(
            turbine_count,
            pool.capacity(),
            monitor_report.as_ref(),
            &stats,
            failed_turbines,
        );

        match fatal {
            Some(e) => Err(e),
            None => {
                info!(
                    records = report.records_ingested,
                    dispatches = report.total_dispatches(),
                    repairs = report.repairs_completed,
                    "[Fleet] Stopped"
                );
                Ok(report)
            }
        }
    }
}

/// Wait for every task. Returns the monitor's report, the turbines that
/// failed, and the first fleet-fatal error.
async fn supervise(
    tasks: &mut JoinSet<TaskExit>,
    cancel: &CancellationToken,
) -> (Option<MonitorReport>, Vec<TurbineId>, Option<FleetError>) {
    let mut monitor_report = None;
    let mut failed_turbines = Vec::new();
    let mut fatal: Option<FleetError> = None;

    while let Some(joined) = tasks.join_next().await {
        let exit = match joined {
            Ok(exit) => exit,
            Err(e) => {
                error!("🔒 [Fleet] Task panicked: {}", e);
                fatal.get_or_insert(FleetError::TaskPanicked(e.to_string()));
                cancel.cancel();
                continue;
            }
        };

        match exit {
            TaskExit::Turbine(id, Ok(())) => info!(turbine_id = id, "[Fleet] Turbine {} stopped", id),
            TaskExit::Turbine(id, Err(e)) => {
                // Other turbines and the monitor carry on.
                error!(turbine_id = id, error = %e, "[Fleet] Turbine {} halted", id);
                failed_turbines.push(id);
            }
            TaskExit::Monitor(Ok(report)) => {
                if !cancel.is_cancelled() {
                    warn!("[Fleet] Monitor stopped on its own, shutting down");
                    cancel.cancel();
                }
                monitor_report = Some(report);
            }
            TaskExit::Monitor(Err(e)) => {
                error!(error = %e, "🛑 [Fleet] Monitor failed, shutting down");
                fatal.get_or_insert(FleetError::Monitor(e));
                cancel.cancel();
            }
            TaskExit::Dispatcher(Ok(())) => {
                if !cancel.is_cancelled() {
                    warn!("[Fleet] Dispatcher stopped on its own, shutting down");
                    cancel.cancel();
                }
            }
            TaskExit::Dispatcher(Err(e)) => {
                error!(error = %e, "🛑 [Fleet] Dispatcher failed, shutting down");
                fatal.get_or_insert(FleetError::Pool(e));
                cancel.cancel();
            }
            TaskExit::Server(Ok(())) => info!("[Fleet] Ingestion server stopped"),
            TaskExit::Server(Err(e)) => {
                error!(error = %e, "🛑 [Fleet] Ingestion server failed, shutting down");
                fatal.get_or_insert(FleetError::Server(e));
                cancel.cancel();
            }
        }
    }

    (monitor_report, failed_turbines, fatal)
}
