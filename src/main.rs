//! turbine-fleet: wind turbine fleet simulation
//!
//! # Usage
//!
//! ```bash
//! # Five turbines, five engineers, in-process telemetry
//! cargo run --release
//!
//! # Scarce engineers, fixed failure timing, stop after a minute
//! cargo run --release -- --engineers 1 --time-to-fail 5 --duration-secs 60
//!
//! # Telemetry over HTTP to the built-in ingestion endpoint
//! cargo run --release -- --transport http --addr 127.0.0.1:8787
//! ```
//!
//! # Environment Variables
//!
//! - `FLEET_CONFIG`: Path to a `fleet_config.toml` (default: `./fleet_config.toml`)
//! - `RUST_LOG`: Logging level (default: info)
//! - `FLEET_LOG_JSON`: Set to "true" for JSON log lines

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use turbine_fleet::config::{FleetConfig, TransportKind};
use turbine_fleet::storage::{JsonlMetricStore, MetricStore};
use turbine_fleet::Fleet;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "turbine-fleet")]
#[command(about = "Wind turbine fleet simulation with a central repair monitor")]
#[command(version)]
struct CliArgs {
    /// Number of turbines
    #[arg(long, env = "FLEET_TURBINES")]
    turbines: Option<u32>,

    /// Number of repair engineers
    #[arg(long, env = "FLEET_ENGINEERS")]
    engineers: Option<usize>,

    /// Seconds between telemetry uploads
    #[arg(long, value_name = "SECS")]
    upload_interval: Option<f64>,

    /// Fixed time-to-fail for every turbine (default: random per turbine)
    #[arg(long, value_name = "SECS")]
    time_to_fail: Option<f64>,

    /// Fixed time-to-repair for every turbine (default: random per turbine)
    #[arg(long, value_name = "SECS")]
    time_to_repair: Option<f64>,

    /// Telemetry transport between turbines and the monitor
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Ingestion server bind address (http transport)
    #[arg(short, long)]
    addr: Option<String>,

    /// URL turbines post telemetry to (http transport)
    #[arg(long)]
    monitor_url: Option<String>,

    /// Directory for per-turbine metric files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Stop after this many seconds (default: run until Ctrl+C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Seed for reproducible turbine parameters and readings
    #[arg(long)]
    seed: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "FLEET_LOG_JSON")]
    log_json: bool,
}

impl CliArgs {
    /// Command-line values win over the config file.
    fn apply(&self, config: &mut FleetConfig) {
        if let Some(n) = self.turbines {
            config.fleet.turbine_count = n;
        }
        if let Some(n) = self.engineers {
            config.fleet.engineer_count = n;
        }
        if let Some(seed) = self.seed {
            config.fleet.seed = Some(seed);
        }
        if let Some(secs) = self.upload_interval {
            config.turbine.upload_interval_secs = secs;
        }
        if self.time_to_fail.is_some() {
            config.turbine.time_to_fail_secs = self.time_to_fail;
        }
        if self.time_to_repair.is_some() {
            config.turbine.time_to_repair_secs = self.time_to_repair;
        }
        if let Some(transport) = self.transport {
            config.telemetry.transport = transport;
        }
        if let Some(addr) = &self.addr {
            config.telemetry.bind_addr.clone_from(addr);
        }
        if let Some(url) = &self.monitor_url {
            config.telemetry.monitor_url.clone_from(url);
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir.clone_from(dir);
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let mut config = FleetConfig::load();
    args.apply(&mut config);
    config.validate().context("Invalid fleet configuration")?;

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  turbine-fleet - Wind Turbine Fleet Simulation");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Turbines: {} | Engineers: {} | Upload interval: {:.1}s | Transport: {:?}",
        config.fleet.turbine_count,
        config.fleet.engineer_count,
        config.turbine.upload_interval_secs,
        config.telemetry.transport
    );

    let store = JsonlMetricStore::open(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to open metric store at {}",
            config.storage.data_dir.display()
        )
    })?;
    info!("💾 Metrics: {}", store.dir().display());
    let store: Arc<dyn MetricStore> = Arc::new(store);

    // Graceful shutdown via Ctrl+C or the run duration
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });
    if let Some(secs) = args.duration_secs {
        let deadline_token = cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("⏱️  Run duration of {}s reached, shutting down", secs);
            deadline_token.cancel();
        });
    }

    let report = Fleet::new(config, store)
        .run(cancel_token)
        .await
        .context("Fleet stopped with an error")?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Run summary");
    info!("  Records ingested:   {}", report.records_ingested);
    info!("  Dispatches:         {}", report.total_dispatches());
    for (turbine_id, count) in &report.dispatches {
        info!("    turbine {:>3}: {}", turbine_id, count);
    }
    info!("  Repairs completed:  {}", report.repairs_completed);
    info!("  Repairs abandoned:  {}", report.repairs_abandoned);
    info!(
        "  Longest queue wait: {:.1}s",
        report.longest_queue_wait.as_secs_f64()
    );
    if report.unconfirmed_breakdowns > 0 {
        warn!("  Ignored broken records from running turbines: {}", report.unconfirmed_breakdowns);
    }
    if !report.failed_turbines.is_empty() {
        warn!("  Failed turbines:    {:?}", report.failed_turbines);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    Ok(())
}
