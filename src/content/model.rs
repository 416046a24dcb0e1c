//! The content model: owner of the versioned site tree.
//!
//! Readers take lock-free snapshots. Writers (UI edits, watcher batches,
//! the initial scan) serialize on `write_lock`, build the next tree off to
//! the side and publish it in one atomic swap, so nobody ever observes a
//! half-applied transaction and versions advance by exactly one.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::change::{
    ChangeBatch, ChangeKind, ChangeSummary, ConflictRecord, EditOutcome, Writer,
};
use super::hash::ContentHash;
use super::kind::{NodeKind, is_under};
use super::node::{ContentNode, Origin};
use super::tree::SiteTree;
use crate::config::{ContentConfig, SiteConfig};
use crate::core::SiteError;
use crate::utils::path::{clean_rel_path, from_rel, to_rel};

/// Field name reported for bad paths.
const PATH_FIELD: &str = "path";

pub struct ContentModel {
    root: PathBuf,
    content: ContentConfig,
    /// Output and cache directories, relative to root
    excluded: Vec<String>,
    current: ArcSwap<SiteTree>,
    write_lock: Mutex<()>,
}

impl ContentModel {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            root: config.root.clone(),
            content: config.content.clone(),
            excluded: config.excluded_prefixes(),
            current: ArcSwap::from_pointee(SiteTree::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Immutable view of the latest published tree.
    pub fn snapshot(&self) -> Arc<SiteTree> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    pub fn get_node(&self, path: &str) -> Option<Arc<ContentNode>> {
        self.current.load().get(path).cloned()
    }

    /// Inside the output or cache directory (or one of them itself).
    pub fn is_excluded(&self, rel: &str) -> bool {
        self.excluded
            .iter()
            .any(|prefix| rel == prefix || is_under(rel, prefix))
    }

    /// Normalize a client-supplied path, rejecting anything the tree
    /// could never contain.
    pub fn validate_path(&self, raw: &str) -> Result<String, SiteError> {
        let rel = clean_rel_path(raw).map_err(|e| SiteError::bad_path(PATH_FIELD, e))?;
        if self.is_excluded(&rel) {
            return Err(SiteError::validation(
                PATH_FIELD,
                format!("`{rel}` is inside the generator's output or cache directory"),
            ));
        }
        Ok(rel)
    }

    pub(super) fn classify(&self, rel: &str, is_dir: bool) -> NodeKind {
        NodeKind::classify(rel, is_dir, &self.content)
    }

    /// Publish `tree` as the current snapshot.
    pub(super) fn commit(&self, tree: SiteTree) {
        self.current.store(Arc::new(tree));
    }

    pub(super) fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    // ========================================================================
    // UI edits
    // ========================================================================

    /// Write (`Some`) or delete (`None`) a file on behalf of the UI.
    ///
    /// If the disk no longer matches the tree, an external write has not
    /// been reconciled yet. The UI write wins and the external content is
    /// reported as lost.
    pub fn apply_edit(
        &self,
        path: &str,
        content: Option<&str>,
    ) -> Result<EditOutcome, SiteError> {
        let rel = self.validate_path(path)?;
        let _guard = self.lock();

        let current = self.snapshot();
        let existing = current.get(&rel).cloned();
        let abs = from_rel(&self.root, &rel);
        let disk = DiskState::read(&abs).map_err(|e| SiteError::system(format!("read {rel}"), e))?;

        if content.is_some() && (existing.as_ref().is_some_and(|n| n.is_dir()) || disk.is_dir()) {
            return Err(SiteError::validation(
                PATH_FIELD,
                format!("`{rel}` is a directory"),
            ));
        }
        if content.is_none() && existing.is_none() && disk.is_missing() {
            return Err(SiteError::NotFound(rel));
        }

        let mut next = current.next();
        let version = next.version();

        let tree_hash = existing.as_ref().and_then(|n| n.hash);
        let conflict = match &disk {
            DiskState::File { hash, .. } if Some(*hash) == tree_hash => None,
            DiskState::Missing if existing.is_none() => None,
            DiskState::Dir if existing.as_ref().is_some_and(|n| n.is_dir()) => None,
            _ => Some(ConflictRecord {
                path: rel.clone(),
                winner: Writer::Ui,
                loser: Writer::External,
                version,
                lost_text: disk.text(),
            }),
        };

        let mut changed = Vec::new();
        let node = match content {
            Some(text) => {
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| SiteError::system(format!("create parent of {rel}"), e))?;
                }
                fs::write(&abs, text).map_err(|e| SiteError::system(format!("write {rel}"), e))?;

                let kind = self.classify(&rel, false);
                let node = ContentNode::file(&rel, kind, text.as_bytes().to_vec(), version, Origin::Ui);
                next.insert(node, &mut changed);
                next.get(&rel).cloned()
            }
            None => {
                let removed = if disk.is_dir() {
                    fs::remove_dir_all(&abs)
                } else {
                    fs::remove_file(&abs)
                };
                match removed {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SiteError::system(format!("delete {rel}"), e)),
                }
                next.remove(&rel, &mut changed);
                None
            }
        };

        let triggers_build = node.as_ref().is_none_or(|n| n.is_valid());
        self.commit(next);

        crate::debug!("content"; "v{} ui {} {}", version, if content.is_some() { "write" } else { "delete" }, rel);

        Ok(EditOutcome {
            node,
            summary: ChangeSummary {
                version,
                changed,
                conflicts: conflict.into_iter().collect(),
                triggers_build,
            },
        })
    }

    // ========================================================================
    // Watcher batches
    // ========================================================================

    /// Apply one batch of external changes as a single transaction.
    ///
    /// Returns `None` when nothing in the tree actually changed, e.g. when
    /// every event was the echo of our own write.
    pub fn apply_changes(&self, batch: &ChangeBatch) -> Option<ChangeSummary> {
        let _guard = self.lock();
        let current = self.snapshot();
        let mut next = current.next();
        let version = next.version();

        let mut changed = Vec::new();
        let mut conflicts = Vec::new();
        let mut triggers_build = false;

        for (abs, kind) in &batch.changes {
            let Some(rel) = to_rel(&self.root, abs) else {
                continue;
            };
            if clean_rel_path(&rel).is_err() || self.is_excluded(&rel) {
                continue;
            }

            let disk = match kind {
                ChangeKind::Removed => DiskState::Missing,
                _ => match DiskState::read(abs) {
                    Ok(disk) => disk,
                    Err(e) => {
                        crate::debug!("content"; "skip unreadable {}: {}", rel, e);
                        continue;
                    }
                },
            };

            match disk {
                DiskState::Missing => {
                    if next.remove(&rel, &mut changed) {
                        triggers_build = true;
                    }
                }
                DiskState::Dir => {
                    next.ensure_dir(&rel, version, Origin::External, &mut changed);
                    // A directory moved in arrives as one event for the whole subtree.
                    if matches!(kind, ChangeKind::Created | ChangeKind::Renamed) {
                        for node in self.read_subtree(abs, version, Origin::External) {
                            let known = next.get(&node.path).is_some_and(|n| n.hash == node.hash);
                            if !known {
                                triggers_build |= node.is_valid() && !node.is_dir();
                                next.insert(node, &mut changed);
                            }
                        }
                    }
                }
                DiskState::File { bytes, hash } => {
                    let existing = next.get(&rel).cloned();
                    if existing.as_ref().is_some_and(|n| n.hash == Some(hash)) {
                        // Echo of our own write, or a touch without content change.
                        continue;
                    }

                    if let Some(old) = &existing
                        && old.origin == Origin::Ui
                        && old.version > batch.observed_version
                    {
                        conflicts.push(ConflictRecord {
                            path: rel.clone(),
                            winner: Writer::External,
                            loser: Writer::Ui,
                            version,
                            lost_text: old.text.clone(),
                        });
                    }

                    let node_kind = self.classify(&rel, false);
                    let node = ContentNode::file(&rel, node_kind, bytes, version, Origin::External);
                    triggers_build |= node.is_valid();
                    next.insert(node, &mut changed);
                }
            }
        }

        if changed.is_empty() {
            return None;
        }

        let mut seen = FxHashSet::default();
        changed.retain(|p| seen.insert(p.clone()));

        self.commit(next);
        crate::debug!("content"; "v{} external: {} path(s)", version, changed.len());

        Some(ChangeSummary {
            version,
            changed,
            conflicts,
            triggers_build,
        })
    }
}

/// What a path holds on disk right now.
enum DiskState {
    Missing,
    Dir,
    File { bytes: Vec<u8>, hash: ContentHash },
}

impl DiskState {
    fn read(path: &Path) -> io::Result<Self> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Self::Dir),
            Ok(_) => {
                let bytes = match fs::read(path) {
                    Ok(bytes) => bytes,
                    // Deleted between stat and read
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::Missing),
                    Err(e) => return Err(e),
                };
                let hash = ContentHash::of_bytes(&bytes);
                Ok(Self::File { bytes, hash })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::Missing),
            Err(e) => Err(e),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Self::Dir)
    }

    fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    fn text(&self) -> Option<String> {
        match self {
            Self::File { bytes, .. } => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }
}
