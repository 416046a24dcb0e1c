//! `[site]` section configuration.
//!
//! ```toml
//! [site]
//! name = "My Blog"    # Shown to the editor; defaults to the directory name
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSectionConfig {
    pub name: Option<String>,
}
