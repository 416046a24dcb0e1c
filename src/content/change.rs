//! Transaction inputs and results for the content model.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::node::ContentNode;

/// What happened to a path on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    /// Destination of a rename (the source is reported as `Removed`)
    Renamed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
        }
    }
}

/// One debounced batch of external changes, applied as one transaction.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// Absolute paths
    pub changes: Vec<(PathBuf, ChangeKind)>,
    /// Tree version when the first event of the batch was observed.
    /// UI edits newer than this raced with the external write.
    pub observed_version: u64,
}

/// The side that made a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Writer {
    Ui,
    External,
}

/// A write that lost a last-writer-wins race.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub path: String,
    pub winner: Writer,
    pub loser: Writer,
    /// Version that holds the winning content
    pub version: u64,
    /// Text of the losing write, when it was text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lost_text: Option<String>,
}

/// Result of one committed transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeSummary {
    pub version: u64,
    /// Every path whose node was added, replaced or removed
    pub changed: Vec<String>,
    pub conflicts: Vec<ConflictRecord>,
    /// False when every changed node is invalid content
    pub triggers_build: bool,
}

/// Result of a UI edit.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// New node, `None` after a deletion
    pub node: Option<Arc<ContentNode>>,
    pub summary: ChangeSummary,
}
