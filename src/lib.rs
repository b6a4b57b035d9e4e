//! Turbine Fleet: wind turbine fleet simulation
//!
//! Simulated turbines emit telemetry and occasionally break down. A central
//! monitor ingests the telemetry, persists it, and sends repair engineers
//! from a bounded pool when a turbine goes from ok to broken.
//!
//! ## Architecture
//!
//! - **Turbine Agent**: telemetry loop and repair-wait loop per turbine
//! - **Ingestion**: ordered queue from turbines (or the HTTP endpoint) to the monitor
//! - **Central Monitor**: persistence, last-status tracking, edge-triggered dispatch
//! - **Repair**: engineer pool, repair board and FIFO dispatcher
//! - **Fleet**: wiring and supervision of all of the above

pub mod api;
pub mod config;
pub mod fleet;
pub mod ingest;
pub mod monitor;
pub mod repair;
pub mod retry;
pub mod storage;
pub mod turbine;
pub mod types;

// Re-export configuration
pub use config::{FleetConfig, TurbineSpec};

// Re-export commonly used types
pub use types::{MetricRecord, OperationalStatus, RepairRequest, TurbineId};

pub use fleet::{Fleet, FleetError, FleetReport};
pub use monitor::{CentralMonitor, MonitorError, MonitorReport};
pub use repair::{DispatchError, EngineerPool, PoolError, RepairBoard, RepairDispatcher};
pub use retry::RetryPolicy;
pub use storage::{InMemoryMetricStore, JsonlMetricStore, MetricStore, StoreError};
pub use turbine::{TurbineAgent, TurbineError, TurbineState};
