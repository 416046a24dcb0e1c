//! Actor Message Definitions
//!
//! ```text
//! FsActor ──Changes/Rescan──▶ ReconcilerActor ◀──Edit/RequestBuild/CancelBuild── RPC
//!                                   │
//!                                   └──SiteEvent──▶ Hub ──▶ subscribers
//! ```

use serde::Serialize;
use tokio::sync::oneshot;

use crate::build::BuildJob;
use crate::content::{ChangeBatch, ConflictRecord, EditOutcome};
use crate::core::SiteError;

// =============================================================================
// ReconcilerActor Messages
// =============================================================================

/// Messages to the Reconciler Actor
#[derive(Debug)]
pub enum ReconcilerMsg {
    /// One debounced batch of external changes
    Changes(ChangeBatch),
    /// The watcher lost track; rebuild the tree from disk
    Rescan,
    /// UI write (`Some`) or delete (`None`)
    Edit {
        path: String,
        content: Option<String>,
        reply: oneshot::Sender<Result<EditOutcome, SiteError>>,
    },
    /// Manual build of `paths` (empty: the whole site); replies with the
    /// job that will cover the current tree
    RequestBuild {
        paths: Vec<String>,
        reply: oneshot::Sender<BuildJob>,
    },
    /// Cancel a queued job
    CancelBuild {
        seq: u64,
        reply: oneshot::Sender<Result<BuildJob, SiteError>>,
    },
    Shutdown,
}

// =============================================================================
// Events pushed to subscribers
// =============================================================================

/// Subscription topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Tree,
    Build,
    Conflict,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Tree, Topic::Build, Topic::Conflict];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tree" => Some(Self::Tree),
            "build" => Some(Self::Build),
            "conflict" => Some(Self::Conflict),
            _ => None,
        }
    }
}

/// A state change worth telling subscribers about.
#[derive(Debug, Clone)]
pub enum SiteEvent {
    TreeChanged { version: u64, changed: Vec<String> },
    BuildStatusChanged(BuildJob),
    Conflict(ConflictRecord),
}

impl SiteEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::TreeChanged { .. } => Topic::Tree,
            Self::BuildStatusChanged(_) => Topic::Build,
            Self::Conflict(_) => Topic::Conflict,
        }
    }
}
