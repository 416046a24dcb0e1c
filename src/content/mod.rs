//! Content model: the in-memory, versioned mirror of the site source tree.
//!
//! # Module Structure
//!
//! - `hash` - blake3 content hash, the modification token of a file node
//! - `kind` - directory / page / article / static / unknown classification
//! - `meta` - front-matter extraction and validation
//! - `node` - `ContentNode` and its wire view
//! - `tree` - `SiteTree`, one immutable versioned snapshot
//! - `change` - transaction inputs (watcher batches) and results
//! - `model` - `ContentModel`, the single writer publishing snapshots
//! - `scan` - initial parallel walk of the site directory

mod change;
mod hash;
mod kind;
mod meta;
mod model;
mod node;
mod scan;
mod tree;


pub use change::{ChangeBatch, ChangeKind, ChangeSummary, ConflictRecord, EditOutcome, Writer};
pub use hash::ContentHash;
pub use kind::NodeKind;
pub use meta::{NodeDiagnostic, PageMeta};
pub use model::ContentModel;
pub use node::{ContentNode, NodeView, Origin};
pub use tree::SiteTree;
