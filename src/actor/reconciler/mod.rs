//! Reconciler Actor - the single owner of site state transitions
//!
//! Watcher batches, UI edits and runner results all funnel through here,
//! one message at a time:
//!
//! ```text
//! FsActor ──Changes──┐                          ┌──▶ Hub (notifications)
//! RPC ─────Edit──────┼──▶ ContentModel ──▶ BuildScheduler ──▶ BuildRunner
//! BuildRunner ─result┘                          └──▶ StatusBoard (getBuildStatus)
//! ```

mod scheduler;
mod status;


pub use scheduler::{BuildStatus, SiteState};
pub use status::StatusBoard;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::messages::{ReconcilerMsg, SiteEvent};
use crate::build::{
    BuildJob, BuildRunner, JobState, RunHandle, RunnerEvent, Trigger, load_history, now_ms,
    save_history,
};
use crate::config::SiteConfig;
use crate::content::{ChangeSummary, ContentModel, EditOutcome};
use crate::core::SiteError;
use crate::rpc::Hub;
use scheduler::BuildScheduler;

/// How often retained jobs are checked against the retention window.
const GC_INTERVAL: Duration = Duration::from_secs(30);

pub struct ReconcilerActor {
    rx: mpsc::Receiver<ReconcilerMsg>,
    model: Arc<ContentModel>,
    runner: BuildRunner,
    scheduler: BuildScheduler,
    board: Arc<StatusBoard>,
    hub: Arc<Hub>,
    history_path: PathBuf,
    runner_tx: mpsc::UnboundedSender<RunnerEvent>,
    runner_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    /// The run whose process is alive, if any
    current: Option<RunHandle>,
    build_on_startup: bool,
}

impl ReconcilerActor {
    /// Restores build history and returns the actor along with the board
    /// readers should poll.
    pub fn new(
        rx: mpsc::Receiver<ReconcilerMsg>,
        model: Arc<ContentModel>,
        config: &SiteConfig,
        hub: Arc<Hub>,
    ) -> (Self, Arc<StatusBoard>) {
        let history_path = config.history_file();
        let history = load_history(&history_path).unwrap_or_else(|e| {
            crate::log!("build"; "ignoring unreadable {}: {}", history_path.display(), e);
            Default::default()
        });

        let scheduler = BuildScheduler::new(&config.build, history);
        let board = Arc::new(StatusBoard::new(scheduler.status()));
        let (runner_tx, runner_rx) = mpsc::unbounded_channel();

        let actor = Self {
            rx,
            model,
            runner: BuildRunner::new(config),
            scheduler,
            board: Arc::clone(&board),
            hub,
            history_path,
            runner_tx,
            runner_rx,
            current: None,
            build_on_startup: config.build.on_startup,
        };
        (actor, board)
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        self.startup().await;

        let mut gc_tick = tokio::time::interval(GC_INTERVAL);
        gc_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let deadline = self.scheduler.next_deadline();
            let wake = tokio::time::Instant::from_std(
                deadline.unwrap_or_else(|| Instant::now() + GC_INTERVAL),
            );

            tokio::select! {
                biased;

                Some(event) = self.runner_rx.recv() => self.on_runner_event(event),

                msg = self.rx.recv() => match msg {
                    Some(ReconcilerMsg::Shutdown) | None => break,
                    Some(msg) => self.dispatch(msg).await,
                },

                _ = tokio::time::sleep_until(wake), if deadline.is_some() => {}

                _ = gc_tick.tick() => {
                    let dropped = self.scheduler.gc(now_ms());
                    if dropped > 0 {
                        crate::debug!("build"; "dropped {} expired job(s)", dropped);
                        self.publish_status();
                    }
                }
            }

            self.poll_start();
        }

        self.wind_down().await;
        self.persist();
        crate::debug!("reconcile"; "stopped");
    }

    /// Stop the running generator, if any, and wait until it is gone so
    /// the output directory is not left half-written.
    async fn wind_down(&mut self) {
        let Some(run) = self.current.take() else {
            return;
        };
        crate::log!("build"; "waiting for build #{} to stop", run.seq);
        let seq = run.seq;
        run.stop();
        while let Some(event) = self.runner_rx.recv().await {
            let released = matches!(event, RunnerEvent::Released { seq: s } if s == seq);
            self.on_runner_event(event);
            if released {
                break;
            }
        }
    }

    /// Populate the tree and queue the first build.
    async fn startup(&mut self) {
        if let Some(summary) = self.blocking(|model| model.scan()).await {
            self.publish_tree(&summary);
            self.scheduler.on_inert_change(summary.version);
            if self.build_on_startup {
                let changed = self.scheduler.on_change(summary.version, Trigger::Startup, Instant::now());
                self.publish_jobs(changed);
            }
        }
        self.publish_status();
        self.poll_start();
    }

    async fn dispatch(&mut self, msg: ReconcilerMsg) {
        match msg {
            ReconcilerMsg::Changes(batch) => {
                if let Some(Some(summary)) = self.blocking(move |model| model.apply_changes(&batch)).await {
                    self.on_committed(&summary, Trigger::WatcherChange);
                }
            }
            ReconcilerMsg::Rescan => {
                crate::log!("watch"; "rescanning site");
                if let Some(summary) = self.blocking(|model| model.scan()).await {
                    self.on_committed(&summary, Trigger::WatcherChange);
                }
            }
            ReconcilerMsg::Edit {
                path,
                content,
                reply,
            } => {
                let result = self.apply_edit(path, content).await;
                if let Ok(outcome) = &result {
                    self.on_committed(&outcome.summary, Trigger::UiEdit);
                }
                let _ = reply.send(result);
            }
            ReconcilerMsg::RequestBuild { paths, reply } => {
                let (job, changed) = self
                    .scheduler
                    .request_build(self.model.version(), paths, Instant::now());
                self.publish_jobs(changed);
                let _ = reply.send(job);
            }
            ReconcilerMsg::CancelBuild { seq, reply } => {
                let result = self.scheduler.cancel(seq);
                if let Ok(job) = &result {
                    crate::log!("build"; "#{} cancelled", job.seq);
                    self.publish_jobs(vec![job.clone()]);
                }
                let _ = reply.send(result);
            }
            ReconcilerMsg::Shutdown => {}
        }
    }

    async fn apply_edit(
        &self,
        path: String,
        content: Option<String>,
    ) -> Result<EditOutcome, SiteError> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.apply_edit(&path, content.as_deref()))
            .await
            .unwrap_or_else(|e| Err(SiteError::system("apply edit", std::io::Error::other(e))))
    }

    /// Run a model transaction off the async workers.
    async fn blocking<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&ContentModel) -> T + Send + 'static,
        T: Send + 'static,
    {
        let model = Arc::clone(&self.model);
        match tokio::task::spawn_blocking(move || f(&model)).await {
            Ok(value) => Some(value),
            Err(e) => {
                crate::log!("reconcile"; "transaction panicked: {}", e);
                None
            }
        }
    }

    /// A transaction landed: tell subscribers, then decide about a build.
    fn on_committed(&mut self, summary: &ChangeSummary, trigger: Trigger) {
        self.publish_tree(summary);
        for conflict in &summary.conflicts {
            crate::log!(
                "conflict";
                "{}: {:?} write won over {:?} write (v{})",
                conflict.path, conflict.winner, conflict.loser, conflict.version
            );
            self.hub.publish(&SiteEvent::Conflict(conflict.clone()));
        }

        if summary.triggers_build {
            let changed = self.scheduler.on_change(summary.version, trigger, Instant::now());
            self.publish_jobs(changed);
        } else {
            crate::debug!("reconcile"; "v{} holds only invalid content, not building", summary.version);
            self.scheduler.on_inert_change(summary.version);
            self.publish_status();
        }
    }

    fn on_runner_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Finished { seq, outcome } => {
                let changed = self.scheduler.on_finished(seq, outcome, Instant::now());
                if let Some(job) = changed.first() {
                    report(job);
                }
                self.publish_jobs(changed);
                self.persist();
            }
            RunnerEvent::Released { seq } => {
                crate::debug!("build"; "#{} released", seq);
                if self.current.as_ref().is_some_and(|run| run.seq == seq) {
                    self.current = None;
                }
                self.scheduler.on_released(seq);
            }
        }
    }

    fn poll_start(&mut self) {
        let Some(job) = self.scheduler.poll_start(Instant::now()) else {
            return;
        };
        let snapshot = self.model.snapshot();
        self.current = Some(self.runner.spawn(&job, &snapshot, self.runner_tx.clone()));
        self.persist();
        self.publish_jobs(vec![job]);
    }

    fn publish_tree(&self, summary: &ChangeSummary) {
        self.hub.publish(&SiteEvent::TreeChanged {
            version: summary.version,
            changed: summary.changed.clone(),
        });
    }

    /// The board is updated first so a client reacting to a notification
    /// reads a status at least as new as the event.
    fn publish_jobs(&self, jobs: Vec<BuildJob>) {
        self.publish_status();
        for job in jobs {
            crate::debug!("build"; "#{} {} (v{})", job.seq, job.state.label(), job.version);
            self.hub.publish(&SiteEvent::BuildStatusChanged(job));
        }
    }

    fn publish_status(&self) {
        self.board.publish(self.scheduler.status());
    }

    fn persist(&self) {
        if let Err(e) = save_history(&self.scheduler.history(), &self.history_path) {
            crate::log!("build"; "cannot save {}: {}", self.history_path.display(), e);
        }
    }
}

/// One status line per finished build.
fn report(job: &BuildJob) {
    let elapsed = match (job.started_at, job.finished_at) {
        (Some(start), Some(end)) => format!(" in {}ms", end.saturating_sub(start)),
        _ => String::new(),
    };
    match job.state {
        JobState::Succeeded => {
            crate::logger::status_success(&format!("build #{} succeeded{}", job.seq, elapsed));
        }
        JobState::Failed => {
            let Some(err) = job.failure() else {
                return;
            };
            let more = job.error_count().saturating_sub(1);
            let detail = if more > 0 {
                format!("{more} more error(s), see getBuildStatus")
            } else {
                String::new()
            };
            crate::logger::status_error(&err.to_string(), &detail);
        }
        JobState::Superseded => {
            crate::debug!("build"; "#{} superseded by newer changes", job.seq);
        }
        _ => {}
    }
}
