//! FileSystem Actor
//!
//! Watches the site directory and sends debounced change batches to the
//! ReconcilerActor. The watcher is created before the initial scan so no
//! event falls into the gap between scanning and watching.
//!
//! Architecture:
//! ```text
//! Watcher → Debouncer (pure timing) → Classifier (tree-aware) → ReconcilerMsg
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::ReconcilerMsg;
use crate::config::WatchConfig;
use crate::content::ContentModel;

// Tree-aware classification (raw changes -> change batch).
mod classifier;
// Pure timing and deduplication.
mod debouncer;
// Watch root attach/re-attach lifecycle.
mod watch_roots;


use classifier::EventClassifier;
use debouncer::{Debouncer, Pending};
use watch_roots::WatchRoots;

type NotifyRx = std::sync::mpsc::Receiver<notify::Result<notify::Event>>;

/// Delay before recreating a watcher that died.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// What the bridge thread forwards to the actor.
enum WatchSignal {
    Event(notify::Event),
    /// The watcher's sender is gone; it must be recreated.
    Closed,
}

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: NotifyRx,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    reconciler_tx: mpsc::Sender<ReconcilerMsg>,
    debouncer: Debouncer,
    model: Arc<ContentModel>,
}

impl FsActor {
    /// Start watching `paths` immediately; events buffer until `run`.
    pub fn new(
        paths: Vec<PathBuf>,
        model: Arc<ContentModel>,
        reconciler_tx: mpsc::Sender<ReconcilerMsg>,
        watch: &WatchConfig,
    ) -> notify::Result<Self> {
        let mut watch_roots = WatchRoots::new(paths);
        let (watcher, notify_rx) = create_watcher(&mut watch_roots)?;

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            reconciler_tx,
            debouncer: Debouncer::from_config(watch),
            model,
        })
    }

    /// Run the actor event loop
    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut watch_roots,
            reconciler_tx,
            mut debouncer,
            model,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<WatchSignal>(64);
        spawn_bridge(notify_rx, async_tx.clone());

        loop {
            tokio::select! {
                biased;
                Some(signal) = async_rx.recv() => match signal {
                    WatchSignal::Event(event) => debouncer.add_event(&event, model.version()),
                    WatchSignal::Closed => {
                        crate::log!("watch"; "watcher stopped, restarting");
                        tokio::time::sleep(RESTART_DELAY).await;
                        watch_roots.reset();
                        match create_watcher(&mut watch_roots) {
                            Ok((fresh, rx)) => {
                                watcher = fresh;
                                spawn_bridge(rx, async_tx.clone());
                                // Events may have been lost while no watcher ran.
                                if reconciler_tx.send(ReconcilerMsg::Rescan).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                crate::log!("watch"; "cannot restart watcher: {}", e);
                                // Try again on the next round.
                                let _ = async_tx.try_send(WatchSignal::Closed);
                            }
                        }
                    }
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    watch_roots.maintain(&mut watcher);
                    if process_changes(&mut debouncer, &reconciler_tx, &model).await.is_err() {
                        break;
                    }
                }
            }
        }
        crate::debug!("watch"; "stopped");
    }
}

/// Create a watcher and attach every existing root to it.
fn create_watcher(roots: &mut WatchRoots) -> notify::Result<(RecommendedWatcher, NotifyRx)> {
    // Create sync channel for notify (it doesn't support async)
    let (notify_tx, notify_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })?;
    roots.attach_existing(&mut watcher)?;
    crate::debug!("watch"; "watching {} root(s)", roots.attached_count());
    Ok((watcher, notify_rx))
}

/// Forward notify events from its sync channel into the actor.
fn spawn_bridge(notify_rx: NotifyRx, async_tx: mpsc::Sender<WatchSignal>) {
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    if async_tx.blocking_send(WatchSignal::Event(event)).is_err() {
                        return; // Actor gone
                    }
                }
                Err(e) => crate::log!("watch"; "notify error: {}", e),
            }
        }
        let _ = async_tx.blocking_send(WatchSignal::Closed);
    });
}

/// Process debounced file changes
///
/// Returns `Err(())` if the ReconcilerActor shut down
async fn process_changes(
    debouncer: &mut Debouncer,
    reconciler_tx: &mpsc::Sender<ReconcilerMsg>,
    model: &ContentModel,
) -> Result<(), ()> {
    let msg = match debouncer.take_if_ready() {
        None => return Ok(()),
        Some(Pending::Rescan) => ReconcilerMsg::Rescan,
        Some(Pending::Batch {
            changes,
            observed_version,
        }) => {
            let Some(batch) = EventClassifier::classify(changes, observed_version, model) else {
                return Ok(());
            };
            for (path, kind) in &batch.changes {
                crate::debug!("watch"; "{}: {}", kind.label(), path.display());
            }
            ReconcilerMsg::Changes(batch)
        }
    };

    reconciler_tx.send(msg).await.map_err(|_| ())
}
