//! Initial population of the tree from disk.

use jwalk::WalkDir;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::fs;
use std::path::Path;

use super::change::ChangeSummary;
use super::model::ContentModel;
use super::node::{ContentNode, Origin};
use crate::utils::path::{clean_rel_path, from_rel, to_rel};

impl ContentModel {
    /// Walk the site directory and publish the result as one snapshot.
    ///
    /// Hidden entries and the output/cache directories are skipped.
    /// Files are read and validated in parallel.
    pub fn scan(&self) -> ChangeSummary {
        let _guard = self.lock();
        let current = self.snapshot();
        let mut next = current.next();
        let version = next.version();

        let mut changed = Vec::new();
        let mut valid = 0usize;
        let mut invalid = 0usize;

        for node in self.read_subtree(self.root(), version, Origin::Scan) {
            if !node.is_dir() {
                if node.is_valid() {
                    valid += 1;
                } else {
                    invalid += 1;
                }
            }
            next.insert(node, &mut changed);
        }

        // Anything the previous tree had that is no longer on disk
        let seen: FxHashSet<&str> = changed.iter().map(String::as_str).collect();
        let stale: Vec<String> = next
            .paths()
            .filter(|p| !seen.contains(p))
            .map(str::to_string)
            .collect();
        for path in stale {
            next.remove(&path, &mut changed);
        }

        self.commit(next);
        crate::log!("content"; "scanned {} file(s), {} invalid (v{})", valid + invalid, invalid, version);

        ChangeSummary {
            version,
            changed,
            conflicts: Vec::new(),
            triggers_build: valid > 0,
        }
    }

    /// Read every tracked entry below `dir` into nodes, sorted by path.
    pub(super) fn read_subtree(&self, dir: &Path, version: u64, origin: Origin) -> Vec<ContentNode> {
        let root = self.root().to_path_buf();
        let mut entries: Vec<(String, bool)> = WalkDir::new(dir)
            .skip_hidden(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|e| {
                let rel = to_rel(&root, &e.path())?;
                let keep = clean_rel_path(&rel).is_ok() && !self.is_excluded(&rel);
                keep.then(|| (rel, e.file_type().is_dir()))
            })
            .collect();
        entries.sort();

        entries
            .into_par_iter()
            .filter_map(|(rel, is_dir)| {
                if is_dir {
                    return Some(ContentNode::directory(rel, version, origin));
                }
                let bytes = match fs::read(from_rel(&root, &rel)) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        crate::debug!("content"; "skip unreadable {}: {}", rel, e);
                        return None;
                    }
                };
                let kind = self.classify(&rel, false);
                Some(ContentNode::file(rel, kind, bytes, version, origin))
            })
            .collect()
    }
}
