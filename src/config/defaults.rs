//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Fleet
// ============================================================================

/// Number of turbines started when nothing else is configured.
pub const DEFAULT_TURBINE_COUNT: u32 = 5;

/// Repair engineers available to the monitor.
pub const DEFAULT_ENGINEER_COUNT: usize = 5;

// ============================================================================
// Turbine Simulation
// ============================================================================

/// Seconds between two telemetry emissions.
pub const DEFAULT_UPLOAD_INTERVAL_SECS: f64 = 1.0;

/// Randomized time-to-fail range (seconds), drawn per turbine.
pub const TIME_TO_FAIL_RANGE_SECS: (f64, f64) = (1.0, 30.0);

/// Randomized time-to-repair range (seconds), drawn per turbine.
pub const TIME_TO_REPAIR_RANGE_SECS: (f64, f64) = (1.0, 5.0);

/// Upper bound (exclusive) of simulated wind speed in km/h.
pub const MAX_WIND_SPEED_KMH: f64 = 100.0;

/// Upper bound (exclusive) of simulated power output in kWh.
pub const MAX_POWER_OUTPUT_KWH: f64 = 3000.0;

// ============================================================================
// Telemetry Transport
// ============================================================================

/// Timeout for a single telemetry POST (seconds).
pub const TELEMETRY_HTTP_TIMEOUT_SECS: u64 = 30;

/// Address the ingestion endpoint binds to in HTTP mode.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Base URL turbines post to in HTTP mode.
pub const DEFAULT_MONITOR_URL: &str = "http://127.0.0.1:8787";

/// Maximum accepted ingestion body size (bytes).
pub const INGEST_BODY_LIMIT_BYTES: usize = 16 * 1024;

// ============================================================================
// Retry
// ============================================================================

/// Total attempts (first try included) before a transient fault is fatal.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first retry (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 200;

/// Backoff ceiling (milliseconds).
pub const RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Exponent cap for the doubling backoff.
pub const RETRY_MAX_BACKOFF_EXPONENT: u32 = 6;

// ============================================================================
// Storage
// ============================================================================

/// Directory holding one JSON-lines file per turbine.
pub const DEFAULT_DATA_DIR: &str = "./data/metrics_data";
