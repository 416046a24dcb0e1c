//! Site error taxonomy.
//!
//! Content problems (malformed front-matter and the like) are not errors:
//! the node is kept in the tree and carries diagnostics instead. Conflicts
//! are not errors either; they travel as [`ConflictRecord`] notifications.
//!
//! [`ConflictRecord`]: crate::content::ConflictRecord

use thiserror::Error;

use crate::utils::path::RelPathError;

#[derive(Debug, Error)]
pub enum SiteError {
    /// Bad payload or path, rejected before touching any state.
    #[error("invalid `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("no such node: {0}")]
    NotFound(String),

    /// Generator exited nonzero, was killed, or produced a catastrophic failure.
    #[error("build #{seq} failed: {message}")]
    Build { seq: u64, message: String },

    /// Build exceeded its time bound.
    #[error("build #{seq} timed out after {secs}s")]
    Timeout { seq: u64, secs: u64 },

    /// Spawn or filesystem failure, fatal to the current operation only.
    #[error("{context}: {source}")]
    System {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SiteError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn system(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::System {
            context: context.into(),
            source,
        }
    }

    /// Wrap a relative path rejection as a validation error on `field`.
    pub fn bad_path(field: &str, err: RelPathError) -> Self {
        Self::validation(field, err.to_string())
    }
}
