#![no_std]
//! Lifecycle manager for a fieldbus master.
//!
//! Brings the master from nothing to fully operational in fixed stages (open
//! device, allocate and initialise the master, validate the device table,
//! activate devices). Every completed stage pushes its undo action; a failed
//! stage unwinds exactly those actions in reverse order, and so does release.

mod api;
mod error;
mod handle;
mod lifecycle;

pub use api::MasterApi;
pub use error::{AcquireError, MasterError};
pub use handle::{MasterHandle, MasterState};
pub use lifecycle::{acquire, Stage};
