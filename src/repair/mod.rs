//! Engineer pool and repair dispatch
//!
//! The monitor is the only component that starts a repair. A broken turbine
//! reports itself to the [`RepairBoard`] and waits on its own inbox; the
//! [`RepairDispatcher`] takes an engineer from the [`EngineerPool`] and
//! delivers an [`EngineerVisit`] to that inbox.

mod board;
mod dispatcher;
mod pool;

pub use board::{RepairBoard, RepairInbox};
pub use dispatcher::{
    repair_dispatcher, DispatchError, DispatchStats, DispatchTicket, DispatchWorker, EngineerVisit,
    RepairDispatcher, RepairOutcome,
};
pub use pool::{EngineerGuard, EngineerPool, PoolError};
