use std::path::{Path, PathBuf};

use super::debouncer::RawChanges;
use crate::content::{ChangeBatch, ChangeKind, ContentModel, SiteTree};
use crate::utils::path::{clean_rel_path, from_rel, normalize_path, to_rel};

/// Turns raw debounced events into a batch the content model can apply.
///
/// Pipeline: filter_ignored → correct_by_existence → recover_from_dir_events → filter_actionable
pub(super) struct EventClassifier;

impl EventClassifier {
    /// Main classification pipeline.
    pub(super) fn classify(
        raw: RawChanges,
        observed_version: u64,
        model: &ContentModel,
    ) -> Option<ChangeBatch> {
        let mut changes = raw;
        let tree = model.snapshot();

        Self::filter_ignored(&mut changes, model);
        Self::correct_by_existence(&mut changes);
        Self::recover_from_dir_events(&mut changes, model, &tree);
        Self::filter_actionable(&mut changes, model.root(), &tree);

        if changes.is_empty() {
            return None;
        }

        let mut changes: Vec<_> = changes.into_iter().collect();
        // Parents before children
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        Some(ChangeBatch {
            changes,
            observed_version,
        })
    }

    /// Drop paths outside the site, hidden paths, and the generator's own
    /// output and cache directories.
    pub(super) fn filter_ignored(changes: &mut RawChanges, model: &ContentModel) {
        changes.retain(|path, _| tracked_rel(model, path).is_some());
    }

    /// Reconcile event kinds with actual filesystem state.
    ///
    /// The watcher may report stale events (e.g., Created for a file that's already
    /// been deleted, or Removed for a file that still exists after an atomic save).
    fn correct_by_existence(changes: &mut RawChanges) {
        let paths: Vec<_> = changes.keys().cloned().collect();
        for path in paths {
            let kind = changes[&path];
            let exists = path.exists();
            match kind {
                ChangeKind::Created if !exists => {
                    crate::debug!("watch"; "discard created (gone): {}", path.display());
                    changes.remove(&path);
                }
                ChangeKind::Modified | ChangeKind::Renamed if !exists => {
                    crate::debug!("watch"; "{}->removed: {}", kind.label(), path.display());
                    changes.insert(path, ChangeKind::Removed);
                }
                ChangeKind::Removed if exists => {
                    crate::debug!("watch"; "downgrade removed->modified: {}", path.display());
                    changes.insert(path, ChangeKind::Modified);
                }
                _ => {}
            }
        }
    }

    /// Recover entry-level events from directory-level events.
    ///
    /// Both kqueue and FSEvents may fail to deliver file-level events after a file
    /// is deleted and recreated (different inode/fd). We only get a directory Modify
    /// event. Compare modified directories against the tree to detect:
    /// - Tracked entries that disappeared → Removed
    /// - Untracked entries that appeared  → Created
    fn recover_from_dir_events(changes: &mut RawChanges, model: &ContentModel, tree: &SiteTree) {
        let modified_dirs: Vec<PathBuf> = changes
            .iter()
            .filter(|(_, k)| **k == ChangeKind::Modified)
            .filter(|(p, _)| p.is_dir())
            .map(|(p, _)| p.clone())
            .collect();

        for dir in &modified_dirs {
            let Some(rel) = tracked_rel(model, dir) else {
                continue;
            };
            Self::detect_disappeared(model.root(), tree, &rel, changes);
            Self::detect_appeared(model, tree, dir, changes);
        }
    }

    /// Detect tracked children that no longer exist.
    fn detect_disappeared(root: &Path, tree: &SiteTree, dir: &str, changes: &mut RawChanges) {
        for node in tree.children(dir) {
            let path = from_rel(root, &node.path);
            if !path.exists() && !changes.contains_key(&path) {
                crate::debug!("watch"; "dir-scan found missing: {}", node.path);
                changes.insert(path, ChangeKind::Removed);
            }
        }
    }

    /// Detect entries on disk the tree does not know about yet.
    fn detect_appeared(model: &ContentModel, tree: &SiteTree, dir: &Path, changes: &mut RawChanges) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = normalize_path(&entry.path());
            if changes.contains_key(&path) {
                continue;
            }
            if let Some(rel) = tracked_rel(model, &path)
                && !tree.contains(&rel)
            {
                crate::debug!("watch"; "dir-scan found untracked: {}", rel);
                changes.insert(path, ChangeKind::Created);
            }
        }
    }

    /// Filter to actionable events only.
    ///
    /// - Created/Renamed: must exist (already corrected above)
    /// - Modified: must be a file; directory mtime noise is dropped
    /// - Removed: must still be in the tree (prevents duplicate removals)
    pub(super) fn filter_actionable(changes: &mut RawChanges, root: &Path, tree: &SiteTree) {
        changes.retain(|p, k| match k {
            ChangeKind::Created | ChangeKind::Renamed => p.exists(),
            ChangeKind::Modified => p.is_file(),
            ChangeKind::Removed => {
                let tracked = to_rel(root, p).is_some_and(|rel| tree.contains(&rel));
                if !tracked {
                    crate::debug!("watch"; "filter removed (not tracked): {}", p.display());
                }
                tracked
            }
        });
    }
}

/// Site-relative path, if the content model would track `path` at all.
fn tracked_rel(model: &ContentModel, path: &Path) -> Option<String> {
    let rel = to_rel(model.root(), path)?;
    (clean_rel_path(&rel).is_ok() && !model.is_excluded(&rel)).then_some(rel)
}
