//! Build history persistence.
//!
//! Only the latest completed job and the sequence counter survive a
//! restart; that is enough for status to be meaningful on startup and for
//! job numbers to never repeat.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use super::job::BuildJob;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildHistory {
    /// Highest sequence number ever handed out
    pub last_seq: u64,
    #[serde(default)]
    pub latest: Option<BuildJob>,
}

/// Check if file content is the same as new content
fn file_content_matches(path: &Path, content: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

pub fn save_history(history: &BuildHistory, path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let json = serde_json::to_string_pretty(history)?;
    if file_content_matches(path, &json) {
        crate::debug!("history"; "unchanged, skipping write");
        return Ok(());
    }

    fs::write(path, &json)?;
    crate::debug!("history"; "saved through #{}", history.last_seq);
    Ok(())
}

/// Restore history; a missing file is an empty history.
pub fn load_history(path: &Path) -> io::Result<BuildHistory> {
    if !path.exists() {
        return Ok(BuildHistory::default());
    }

    let json = fs::read_to_string(path)?;
    let history: BuildHistory = serde_json::from_str(&json)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    crate::debug!("history"; "restored through #{}", history.last_seq);
    Ok(history)
}
