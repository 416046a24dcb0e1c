use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use rustc_hash::FxHashMap;

use crate::config::WatchConfig;
use crate::content::ChangeKind;
use crate::utils::path::normalize_path;

/// Path → what happened to it during the current window.
pub(super) type RawChanges = FxHashMap<PathBuf, ChangeKind>;

/// What the debouncer hands over once the window closes.
#[derive(Debug)]
pub(super) enum Pending {
    Batch {
        changes: RawChanges,
        observed_version: u64,
    },
    /// The watcher dropped events; only a full rescan is trustworthy.
    Rescan,
}

/// Pure debouncer: only handles timing and event deduplication.
/// No business logic, no global state access.
pub(super) struct Debouncer {
    pub(super) changes: RawChanges,
    /// Tree version when the first event of the window arrived
    pub(super) observed_version: Option<u64>,
    pub(super) rescan: bool,
    pub(super) last_event: Option<Instant>,
    pub(super) last_batch: Option<Instant>,
    debounce: Duration,
    cooldown: Duration,
}

impl Debouncer {
    pub(super) fn new(debounce: Duration, cooldown: Duration) -> Self {
        Self {
            changes: FxHashMap::default(),
            observed_version: None,
            rescan: false,
            last_event: None,
            last_batch: None,
            debounce,
            cooldown,
        }
    }

    pub(super) fn from_config(watch: &WatchConfig) -> Self {
        Self::new(
            Duration::from_millis(watch.debounce_ms),
            Duration::from_millis(watch.cooldown_ms),
        )
    }

    /// Add a notify event observed while the tree was at `version`.
    pub(super) fn add_event(&mut self, event: &notify::Event, version: u64) {
        use notify::EventKind;

        if event.need_rescan() {
            crate::debug!("watch"; "watcher asked for a rescan");
            self.rescan = true;
            self.touch(version);
            return;
        }

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            // Ignore metadata-only changes (mtime/atime/chmod noise)
            EventKind::Modify(ModifyKind::Metadata(_)) => return,
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.add_rename(mode, &event.paths, version);
                return;
            }
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => return,
        };

        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);
        for path in &event.paths {
            self.record(path, kind, version);
        }
    }

    /// Renames carry the source, the destination, or both.
    fn add_rename(&mut self, mode: RenameMode, paths: &[PathBuf], version: u64) {
        crate::debug!("watch"; "raw rename {:?}: {:?}", mode, paths);
        match (mode, paths) {
            (RenameMode::Both, [from, to, ..]) => {
                self.record(from, ChangeKind::Removed, version);
                self.record(to, ChangeKind::Renamed, version);
            }
            (RenameMode::From, _) => {
                for path in paths {
                    self.record(path, ChangeKind::Removed, version);
                }
            }
            // `To`, or a side we cannot tell: the classifier corrects
            // sources that no longer exist to `Removed`.
            _ => {
                for path in paths {
                    self.record(path, ChangeKind::Renamed, version);
                }
            }
        }
    }

    /// Record one path, applying dedup rules:
    /// - Remove + Create/Modify/Rename → the new kind (file was restored)
    /// - Modify/Rename + Remove → Remove (file was deleted)
    /// - Create + Remove → nothing (appeared then vanished)
    /// - Modify + Rename → Rename (replaced by a moved-in entry)
    /// - otherwise the first event wins
    fn record(&mut self, path: &Path, kind: ChangeKind, version: u64) {
        use ChangeKind::*;

        if is_temp_file(path) {
            return;
        }
        let path = normalize_path(path);

        let Some(&existing) = self.changes.get(&path) else {
            crate::debug!("watch"; "event {}: {}", kind.label(), path.display());
            self.changes.insert(path, kind);
            self.touch(version);
            return;
        };

        match (existing, kind) {
            (Removed, Created | Modified | Renamed) | (Modified, Renamed) => {
                crate::debug!("watch"; "{}->{}: {}", existing.label(), kind.label(), path.display());
                self.changes.insert(path, kind);
            }
            (Modified | Renamed, Removed) => {
                crate::debug!("watch"; "upgrade {}->removed: {}", existing.label(), path.display());
                self.changes.insert(path, Removed);
            }
            (Created, Removed) => {
                crate::debug!("watch"; "discard created+removed: {}", path.display());
                self.changes.remove(&path);
            }
            _ => return,
        }
        self.touch(version);
    }

    fn touch(&mut self, version: u64) {
        self.observed_version.get_or_insert(version);
        self.last_event = Some(Instant::now());
    }

    /// Take the window's events once debounce and cooldown have elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<Pending> {
        let last_event = self.last_event?;
        if last_event.elapsed() < self.debounce || self.cooling_down() {
            return None;
        }

        self.last_event = None;
        let observed = self.observed_version.take();
        let changes = std::mem::take(&mut self.changes);

        let pending = if std::mem::take(&mut self.rescan) {
            Pending::Rescan
        } else {
            match observed {
                Some(observed_version) if !changes.is_empty() => Pending::Batch {
                    changes,
                    observed_version,
                },
                // Everything in the window cancelled out
                _ => return None,
            }
        };

        self.last_batch = Some(Instant::now());
        Some(pending)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        last_event.elapsed() >= self.debounce
            && !self.cooling_down()
            && (self.rescan || !self.changes.is_empty())
    }

    fn cooling_down(&self) -> bool {
        self.last_batch
            .is_some_and(|t| t.elapsed() < self.cooldown)
    }

    /// Precise sleep duration until next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining = self.debounce.saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_batch
            .map(|t| self.cooldown.saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with('#')
        || name == "4913" // vim's write-permission probe
}
