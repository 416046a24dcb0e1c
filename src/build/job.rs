//! Build job records and their lifecycle.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::diagnostics::{Diagnostic, Severity};
use crate::core::SiteError;

/// Why a build was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Manual,
    WatcherChange,
    UiEdit,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Superseded,
    Cancelled,
}

impl JobState {
    /// No further transition is possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    fn allows(self, to: Self) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Queued, Running | Superseded | Cancelled)
                | (Running, Succeeded | Failed | Superseded)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What the runner reports when the generator is done (or gave up on).
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// One invocation of the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub seq: u64,
    pub trigger: Trigger,
    pub state: JobState,
    /// Tree version the job builds
    pub version: u64,
    /// Site-relative sources to rebuild; empty means the whole site
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Unix milliseconds
    pub queued_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl BuildJob {
    pub fn new(seq: u64, trigger: Trigger, version: u64) -> Self {
        Self {
            seq,
            trigger,
            state: JobState::Queued,
            version,
            paths: Vec::new(),
            diagnostics: Vec::new(),
            queued_at: now_ms(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            timed_out: false,
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    pub fn is_partial(&self) -> bool {
        !self.paths.is_empty()
    }

    /// Whether building this job also builds `paths` (empty: everything).
    pub fn covers(&self, paths: &[String]) -> bool {
        !self.is_partial() || (!paths.is_empty() && paths.iter().all(|p| self.paths.contains(p)))
    }

    /// Move to `to` if the lifecycle allows it.
    fn transition(&mut self, to: JobState) -> bool {
        if !self.state.allows(to) {
            return false;
        }
        self.state = to;
        if to.is_terminal() {
            self.finished_at = Some(now_ms());
        }
        true
    }

    pub fn start(&mut self) -> bool {
        let started = self.transition(JobState::Running);
        if started {
            self.started_at = Some(now_ms());
        }
        started
    }

    pub fn cancel(&mut self) -> bool {
        self.transition(JobState::Cancelled)
    }

    pub fn supersede(&mut self) -> bool {
        self.transition(JobState::Superseded)
    }

    /// Record the generator's result.
    pub fn finish(&mut self, outcome: RunOutcome) -> bool {
        let to = if outcome.success {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        if !self.transition(to) {
            return false;
        }
        self.exit_code = outcome.exit_code;
        self.timed_out = outcome.timed_out;
        self.diagnostics = outcome.diagnostics;
        true
    }

    /// The failure as an error, for logs and the status line.
    pub fn failure(&self) -> Option<SiteError> {
        if self.state != JobState::Failed {
            return None;
        }
        if self.timed_out {
            let elapsed = match (self.started_at, self.finished_at) {
                (Some(start), Some(end)) => end.saturating_sub(start) / 1000,
                _ => 0,
            };
            return Some(SiteError::Timeout {
                seq: self.seq,
                secs: elapsed,
            });
        }
        let message = match self.first_error() {
            Some(d) => match (&d.source, d.line) {
                (Some(source), Some(line)) => format!("{source}:{line}: {}", d.message),
                (Some(source), None) => format!("{source}: {}", d.message),
                _ => d.message.clone(),
            },
            None => "generator reported no error".to_string(),
        };
        Some(SiteError::Build {
            seq: self.seq,
            message,
        })
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// First error, for one-line status output.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
