//! The cyclic process-data task.

pub mod config;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use config::*;
pub use scheduler::*;
pub use state::*;
pub use stats::*;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Raised once to halt the cycle before its next tick.
pub type StopSignal = Signal<CriticalSectionRawMutex, ()>;
