//! `[watch]` section configuration.
//!
//! ```toml
//! [watch]
//! enable = true
//! debounce_ms = 300   # Quiet period before a batch is delivered
//! cooldown_ms = 800   # Minimum gap between two batches
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enable: bool,
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
}

impl WatchConfig {
    pub const DEBOUNCE: FieldPath = FieldPath::new("watch.debounce_ms");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.debounce_ms == 0 {
            diag.error(Self::DEBOUNCE, "must be greater than zero");
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enable: true,
            debounce_ms: 300,
            cooldown_ms: 800,
        }
    }
}
