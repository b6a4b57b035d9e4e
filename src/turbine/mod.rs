//! Turbine Agent
//!
//! Each turbine runs two loops under one task:
//!
//! - **telemetry**: emit a record, sleep one interval, advance the clock,
//!   break down once `elapsed >= time_to_fail`
//! - **repair-wait**: when broken, report to the repair board, wait for an
//!   engineer, repair for `time_to_repair`, reset
//!
//! If either loop ends the other is cancelled and the error is returned.

mod agent;
mod state;

pub use agent::{TurbineAgent, TurbineError, TurbineHandle};
pub use state::{TransitionError, TurbineState};
