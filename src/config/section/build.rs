//! `[build]` section configuration.
//!
//! ```toml
//! [build]
//! coalesce_ms = 400       # Rapid edits within this window share one build
//! retention_secs = 600    # Completed jobs are kept this long...
//! retention_max = 20      # ...and at most this many
//! on_startup = true       # Build once when the server starts
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub coalesce_ms: u64,
    pub retention_secs: u64,
    pub retention_max: usize,
    pub on_startup: bool,
}

impl BuildConfig {
    pub const RETENTION_MAX: FieldPath = FieldPath::new("build.retention_max");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.retention_max == 0 {
            diag.error_with_hint(
                Self::RETENTION_MAX,
                "must keep at least one completed job",
                "the latest result is always retained",
            );
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            coalesce_ms: 400,
            retention_secs: 600,
            retention_max: 20,
            on_startup: true,
        }
    }
}
