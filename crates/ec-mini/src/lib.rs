//! Minimal cyclic fieldbus master.
//!
//! Acquires a master through [`ec_master`], then drives the outputs of one
//! device kind one channel at a time from a fixed-period task.

pub mod config;
pub mod cycle;
pub mod runtime;
pub mod sequencer;
pub mod sim;

pub use config::{AppConfig, ConfigError};
pub use cycle::{CycleConfig, CyclePhase, CycleState, StatsSnapshot};
pub use runtime::{Runtime, StartError, StopError};
pub use sequencer::{NextMatch, Sequencer};
