//! Fleet Configuration - simulation parameters as operator-tunable TOML values
//!
//! Every struct implements `Default` so a missing file, a missing section, or
//! a missing key all fall back to the built-in values in [`super::defaults`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::retry::RetryPolicy;
use crate::types::TurbineId;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a fleet run.
///
/// Load with `FleetConfig::load()` which searches:
/// 1. `$FLEET_CONFIG` env var
/// 2. `./fleet_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub fleet: FleetSection,

    #[serde(default)]
    pub turbine: TurbineSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub storage: StorageSection,
}

impl FleetConfig {
    /// Load configuration using the standard search order:
    /// 1. `$FLEET_CONFIG` environment variable
    /// 2. `./fleet_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("FLEET_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded fleet config from FLEET_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from FLEET_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "FLEET_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("fleet_config.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded fleet config from ./fleet_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./fleet_config.toml, using defaults");
                }
            }
        }

        info!("No fleet_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML (used by `--print-config`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.fleet.turbine_count == 0 {
            errors.push("fleet.turbine_count must be at least 1".to_string());
        }
        if self.fleet.engineer_count == 0 {
            errors.push("fleet.engineer_count must be at least 1".to_string());
        }

        let t = &self.turbine;
        check_interval("turbine.upload_interval_secs", t.upload_interval_secs, &mut errors);
        if let Some(v) = t.time_to_fail_secs {
            if !(v.is_finite() && v >= 0.0) {
                errors.push(format!("turbine.time_to_fail_secs ({v}) must be a non-negative number"));
            }
        }
        if let Some(v) = t.time_to_repair_secs {
            check_duration("turbine.time_to_repair_secs", v, &mut errors);
        }

        if self.telemetry.timeout_secs == 0 {
            errors.push("telemetry.timeout_secs must be at least 1".to_string());
        }
        if self.telemetry.transport == TransportKind::Http && self.telemetry.monitor_url.is_empty() {
            errors.push("telemetry.monitor_url is required for the http transport".to_string());
        }

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(format!(
                "retry.base_delay_ms ({}) must be <= retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Draw independent simulation parameters for every turbine.
    ///
    /// Fixed values from the `[turbine]` section apply to all turbines;
    /// anything left unset is randomized per turbine.
    pub fn turbine_specs<R: Rng>(&self, rng: &mut R) -> Vec<TurbineSpec> {
        (1..=self.fleet.turbine_count)
            .map(|id| TurbineSpec::draw(id, &self.turbine, rng))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

/// A sleep length: non-negative and representable as a [`Duration`].
fn check_duration(name: &str, secs: f64, errors: &mut Vec<String>) {
    if let Err(e) = Duration::try_from_secs_f64(secs) {
        errors.push(format!("{name} ({secs}) is not a valid duration: {e}"));
    }
}

/// A tick length: a valid duration that is also non-zero.
fn check_interval(name: &str, secs: f64, errors: &mut Vec<String>) {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if d.is_zero() => errors.push(format!("{name} ({secs}) must be greater than zero")),
        Ok(_) => {}
        Err(e) => errors.push(format!("{name} ({secs}) is not a valid duration: {e}")),
    }
}

// ============================================================================
// Fleet Section
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSection {
    #[serde(default = "default_turbine_count")]
    pub turbine_count: u32,

    /// Engineer pool capacity
    #[serde(default = "default_engineer_count")]
    pub engineer_count: usize,

    /// Seed for reproducible runs; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_turbine_count() -> u32 {
    defaults::DEFAULT_TURBINE_COUNT
}
fn default_engineer_count() -> usize {
    defaults::DEFAULT_ENGINEER_COUNT
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            turbine_count: default_turbine_count(),
            engineer_count: default_engineer_count(),
            seed: None,
        }
    }
}

// ============================================================================
// Turbine Section
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurbineSection {
    #[serde(default = "default_upload_interval")]
    pub upload_interval_secs: f64,

    /// Fixed time-to-fail for every turbine; randomized per turbine when unset
    #[serde(default)]
    pub time_to_fail_secs: Option<f64>,

    /// Fixed time-to-repair for every turbine; randomized per turbine when unset
    #[serde(default)]
    pub time_to_repair_secs: Option<f64>,

    /// Draw new wind/power readings each time a repair completes
    #[serde(default)]
    pub refresh_readings_on_repair: bool,
}

fn default_upload_interval() -> f64 {
    defaults::DEFAULT_UPLOAD_INTERVAL_SECS
}

impl Default for TurbineSection {
    fn default() -> Self {
        Self {
            upload_interval_secs: default_upload_interval(),
            time_to_fail_secs: None,
            time_to_repair_secs: None,
            refresh_readings_on_repair: false,
        }
    }
}

// ============================================================================
// Telemetry Section
// ============================================================================

/// How turbines ship telemetry to the monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process channel straight into the ingestion queue
    #[default]
    Channel,
    /// JSON POST to the ingestion endpoint served by this process
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_monitor_url")]
    pub monitor_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind_addr() -> String {
    defaults::DEFAULT_BIND_ADDR.to_string()
}
fn default_monitor_url() -> String {
    defaults::DEFAULT_MONITOR_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    defaults::TELEMETRY_HTTP_TIMEOUT_SECS
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            bind_addr: default_bind_addr(),
            monitor_url: default_monitor_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ============================================================================
// Retry Section
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    defaults::RETRY_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    defaults::RETRY_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    defaults::RETRY_MAX_DELAY_MS
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ============================================================================
// Storage Section
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DATA_DIR)
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ============================================================================
// Per-Turbine Parameters
// ============================================================================

/// Creation-time parameters of one turbine. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TurbineSpec {
    pub id: TurbineId,
    pub wind_speed: f64,
    pub power_output_kwh: f64,
    pub upload_interval_secs: f64,
    pub time_to_fail_secs: f64,
    pub time_to_repair_secs: f64,
    pub refresh_readings_on_repair: bool,
}

impl TurbineSpec {
    /// Fully specified turbine, mainly for tests and scripted scenarios.
    pub const fn new(
        id: TurbineId,
        upload_interval_secs: f64,
        time_to_fail_secs: f64,
        time_to_repair_secs: f64,
    ) -> Self {
        Self {
            id,
            wind_speed: 0.0,
            power_output_kwh: 0.0,
            upload_interval_secs,
            time_to_fail_secs,
            time_to_repair_secs,
            refresh_readings_on_repair: false,
        }
    }

    fn draw<R: Rng>(id: TurbineId, section: &TurbineSection, rng: &mut R) -> Self {
        let (fail_lo, fail_hi) = defaults::TIME_TO_FAIL_RANGE_SECS;
        let (repair_lo, repair_hi) = defaults::TIME_TO_REPAIR_RANGE_SECS;
        Self {
            id,
            wind_speed: random_wind_speed(rng),
            power_output_kwh: random_power_output(rng),
            upload_interval_secs: section.upload_interval_secs,
            time_to_fail_secs: section
                .time_to_fail_secs
                .unwrap_or_else(|| rng.gen_range(fail_lo..fail_hi)),
            time_to_repair_secs: section
                .time_to_repair_secs
                .unwrap_or_else(|| rng.gen_range(repair_lo..repair_hi)),
            refresh_readings_on_repair: section.refresh_readings_on_repair,
        }
    }

    /// Reject timings that cannot drive the simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let id = self.id;
        check_interval(&format!("turbine {id} upload_interval_secs"), self.upload_interval_secs, &mut errors);
        check_duration(&format!("turbine {id} time_to_repair_secs"), self.time_to_repair_secs, &mut errors);
        if self.time_to_fail_secs.is_nan() || self.time_to_fail_secs < 0.0 {
            errors.push(format!(
                "turbine {id} time_to_fail_secs ({}) must be a non-negative number",
                self.time_to_fail_secs
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Saturates for out-of-range values; [`validate`](Self::validate)
    /// rejects those up front.
    pub fn upload_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.upload_interval_secs).unwrap_or(Duration::MAX)
    }

    pub fn time_to_repair(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_to_repair_secs).unwrap_or(Duration::MAX)
    }
}

/// Wind speed in km/h, uniform in [0, 100).
pub fn random_wind_speed<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..defaults::MAX_WIND_SPEED_KMH)
}

/// Power output in kWh, uniform in [0, 3000).
pub fn random_power_output<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..defaults::MAX_POWER_OUTPUT_KWH)
}
