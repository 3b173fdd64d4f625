//! Application-level orchestration.
//!
//! This module owns the update run lifecycle (locking, logging, interrupt
//! handling) and post-run processing such as history auto-save and exports.
//! The CLI layer calls into this module to keep responsibilities separated.

mod controller;
mod post_process;

pub use controller::{run_update, run_update_until, shutdown_signal};
pub use post_process::{process_run_completion, ProcessedRun};
