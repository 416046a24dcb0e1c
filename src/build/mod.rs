//! Build jobs and the external generator.
//!
//! - [`job`]: `BuildJob` records and their one-way lifecycle
//! - [`runner`]: subprocess supervision with timeout and grace period
//! - [`diagnostics`]: best-effort parsing of generator output
//! - [`history`]: latest result and sequence counter across restarts

mod diagnostics;
mod history;
mod job;
mod runner;

pub use diagnostics::{Diagnostic, DiagnosticParser, Severity};
pub use history::{BuildHistory, load_history, save_history};
pub use job::{BuildJob, JobState, RunOutcome, Trigger, now_ms};
pub use runner::{BuildRunner, RunHandle, RunnerEvent};
