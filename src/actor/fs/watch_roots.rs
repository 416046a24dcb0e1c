use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// Keeps the desired roots attached to whatever watcher is current.
///
/// A root that is deleted loses its watch; once it exists again it is
/// attached on the next `maintain`. After the watcher itself is recreated,
/// `reset` forgets every handle so all roots are attached afresh.
pub(super) struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    /// Attach every root that exists now. Fails only if none could be.
    pub(super) fn attach_existing(
        &mut self,
        watcher: &mut RecommendedWatcher,
    ) -> notify::Result<()> {
        let mut last_error = None;
        for path in self.desired.iter().filter(|p| p.exists()) {
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    self.attached.insert(path.clone());
                }
                Err(e) => {
                    crate::debug!("watch"; "cannot watch {}: {}", path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if self.attached.is_empty() => Err(e),
            _ => Ok(()),
        }
    }

    pub(super) fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        self.attached.retain(|path| {
            let alive = path.exists();
            if !alive {
                crate::debug!("watch"; "watch root vanished: {}", path.display());
            }
            alive
        });

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                self.attached.insert(path.clone());
                crate::log!("watch"; "re-attached {}", path.display());
            }
        }
    }

    /// Forget all handles (the watcher they belonged to is gone).
    pub(super) fn reset(&mut self) {
        self.attached.clear();
    }

    pub(super) fn attached_count(&self) -> usize {
        self.attached.len()
    }
}
