//! Fleet Configuration Module
//!
//! Simulation parameters loaded from TOML, overridable from the command line.
//!
//! ## Loading Order
//!
//! 1. `FLEET_CONFIG` environment variable (path to TOML file)
//! 2. `fleet_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded [`FleetConfig`] is passed explicitly to the fleet supervisor;
//! nothing in the crate reads configuration from ambient state.

pub mod defaults;
mod fleet_config;

pub use fleet_config::*;
