//! The dispatch engine — one batch pass over due queue items.

pub mod allocator;
pub mod followup;
pub mod ledger;
pub mod pass;
pub mod tracker;

pub use pass::{PassReport, run_pass};
