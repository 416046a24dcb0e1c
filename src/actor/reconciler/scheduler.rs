//! Build scheduling state machine.
//!
//! ```text
//!            mutation                 coalesce window over
//!   Clean ───────────▶ Dirty (queued) ────────────────────▶ Building
//!     ▲                   ▲                                   │  │
//!     │  succeeded        │ finished (result superseded)      │  │ mutation
//!     └───────────────────┼───────────────────────────────────┘  ▼
//!                         └──────────────────────── DirtyWhileBuilding
//! ```
//!
//! Pure: no I/O, no clocks of its own. The actor feeds it mutations and
//! runner events and asks it which job to start next.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::build::{BuildHistory, BuildJob, JobState, RunOutcome, Trigger};
use crate::config::BuildConfig;
use crate::core::SiteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteState {
    Clean,
    Dirty,
    Building,
    DirtyWhileBuilding,
}

/// Everything `getBuildStatus` reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    pub state: SiteState,
    pub version: u64,
    pub queued: Option<BuildJob>,
    pub running: Option<BuildJob>,
    /// Most recent completed, non-superseded job
    pub latest: Option<BuildJob>,
    /// Completed jobs still inside the retention window, oldest first
    pub recent: Vec<BuildJob>,
}

pub struct BuildScheduler {
    next_seq: u64,
    /// Latest tree version seen
    version: u64,
    /// Tree changed since the last successful build
    dirty: bool,
    queued: Option<(BuildJob, Instant)>,
    running: Option<BuildJob>,
    /// The tree moved on while `running` was building
    supersede_running: Option<Trigger>,
    /// Job whose process is alive (may outlive `running` after a timeout)
    busy: Option<u64>,
    latest: Option<BuildJob>,
    recent: VecDeque<BuildJob>,
    coalesce: Duration,
    retention: Duration,
    retention_max: usize,
}

impl BuildScheduler {
    pub fn new(config: &BuildConfig, history: BuildHistory) -> Self {
        Self {
            next_seq: history.last_seq + 1,
            version: 0,
            dirty: true,
            queued: None,
            running: None,
            supersede_running: None,
            busy: None,
            latest: history.latest,
            recent: VecDeque::new(),
            coalesce: Duration::from_millis(config.coalesce_ms),
            retention: Duration::from_secs(config.retention_secs),
            retention_max: config.retention_max,
        }
    }

    pub fn state(&self) -> SiteState {
        match (&self.running, self.supersede_running) {
            (Some(_), Some(_)) => SiteState::DirtyWhileBuilding,
            (Some(_), None) => SiteState::Building,
            (None, _) if self.dirty => SiteState::Dirty,
            (None, _) => SiteState::Clean,
        }
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn latest(&self) -> Option<&BuildJob> {
        self.latest.as_ref()
    }

    pub fn history(&self) -> BuildHistory {
        BuildHistory {
            last_seq: self.last_seq(),
            latest: self.latest.clone(),
        }
    }

    pub fn status(&self) -> BuildStatus {
        BuildStatus {
            state: self.state(),
            version: self.version,
            queued: self.queued.as_ref().map(|(job, _)| job.clone()),
            running: self.running.clone(),
            latest: self.latest.clone(),
            recent: self.recent.iter().cloned().collect(),
        }
    }

    // ========================================================================
    // inputs
    // ========================================================================

    /// A committed transaction that warrants a build.
    ///
    /// Returns every job whose state changed.
    pub fn on_change(&mut self, version: u64, trigger: Trigger, now: Instant) -> Vec<BuildJob> {
        self.version = self.version.max(version);
        self.dirty = true;

        if let Some(running) = &self.running
            && running.version < self.version
        {
            // Rebuilt once the current job is done.
            self.supersede_running.get_or_insert(trigger);
            if self.queued.is_none() {
                return Vec::new();
            }
        }
        self.enqueue(trigger, Vec::new(), now + self.coalesce)
    }

    /// A committed transaction that does not warrant a build on its own.
    pub fn on_inert_change(&mut self, version: u64) {
        self.version = self.version.max(version);
        self.dirty = true;
    }

    /// Explicit rebuild of `paths` (empty: the whole site). Idempotent
    /// while nothing changed: hands back the job that already covers it.
    pub fn request_build(
        &mut self,
        version: u64,
        paths: Vec<String>,
        now: Instant,
    ) -> (BuildJob, Vec<BuildJob>) {
        self.version = self.version.max(version);

        if let Some((job, due)) = &mut self.queued
            && job.version == self.version
            && job.covers(&paths)
        {
            // Adopted: starts as soon as the slot is free.
            *due = (*due).min(now);
            return (job.clone(), Vec::new());
        }
        if let Some(job) = &self.running {
            if job.version == self.version
                && self.supersede_running.is_none()
                && job.covers(&paths)
            {
                return (job.clone(), Vec::new());
            }
            if job.version < self.version {
                self.supersede_running.get_or_insert(Trigger::Manual);
            }
        }

        let changed = self.enqueue(Trigger::Manual, paths, now);
        let job = self
            .queued
            .as_ref()
            .map(|(job, _)| job.clone())
            .unwrap_or_else(|| BuildJob::new(self.last_seq(), Trigger::Manual, self.version));
        (job, changed)
    }

    /// Cancel the queued job `seq`.
    ///
    /// The running job loses its pending rebuild with it and is reported
    /// normally when it finishes.
    pub fn cancel(&mut self, seq: u64) -> Result<BuildJob, SiteError> {
        if let Some((mut job, _)) = self.queued.take_if(|(job, _)| job.seq == seq) {
            self.supersede_running = None;
            job.cancel();
            return Ok(job);
        }
        if self.running.as_ref().is_some_and(|job| job.seq == seq) {
            return Err(SiteError::validation(
                "seq",
                format!("build #{seq} is already running and can only be superseded"),
            ));
        }
        Err(SiteError::NotFound(format!("queued build #{seq}")))
    }

    /// Start the queued job if its window has passed and the runner is free.
    pub fn poll_start(&mut self, now: Instant) -> Option<BuildJob> {
        if self.busy.is_some() || self.running.is_some() {
            return None;
        }
        let (mut job, _) = self.queued.take_if(|(_, due)| *due <= now)?;
        job.start();
        self.busy = Some(job.seq);
        self.running = Some(job.clone());
        Some(job)
    }

    /// When `poll_start` could next succeed.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.busy.is_some() || self.running.is_some() {
            return None;
        }
        self.queued.as_ref().map(|(_, due)| *due)
    }

    /// The runner has a result for `seq`.
    pub fn on_finished(&mut self, seq: u64, outcome: RunOutcome, now: Instant) -> Vec<BuildJob> {
        let Some(mut job) = self.running.take_if(|job| job.seq == seq) else {
            crate::debug!("build"; "ignoring result of unknown job #{}", seq);
            return Vec::new();
        };

        if let Some(trigger) = self.supersede_running.take() {
            job.supersede();
            let mut changed = vec![job];
            if self.queued.is_none() {
                changed.extend(self.enqueue(trigger, Vec::new(), now));
            }
            return changed;
        }

        job.finish(outcome);
        if job.state == JobState::Succeeded && !job.is_partial() && job.version >= self.version {
            self.dirty = false;
        }
        self.latest = Some(job.clone());
        self.recent.push_back(job.clone());
        vec![job]
    }

    /// The process for `seq` is gone; the slot is free.
    pub fn on_released(&mut self, seq: u64) {
        if self.busy == Some(seq) {
            self.busy = None;
        }
    }

    /// Drop completed jobs past the retention window or over the cap.
    pub fn gc(&mut self, now_ms: u64) -> usize {
        let before = self.recent.len();
        let window = self.retention.as_millis() as u64;
        self.recent
            .retain(|job| job.finished_at.is_none_or(|t| now_ms.saturating_sub(t) <= window));
        while self.recent.len() > self.retention_max {
            self.recent.pop_front();
        }
        before - self.recent.len()
    }

    /// Queue a job for the current version, superseding any queued one.
    ///
    /// Edits restart the window; a pending manual request keeps its own.
    /// The new job builds whatever the superseded one would have.
    fn enqueue(
        &mut self,
        trigger: Trigger,
        mut paths: Vec<String>,
        mut due: Instant,
    ) -> Vec<BuildJob> {
        let mut changed = Vec::new();
        if let Some((mut old, old_due)) = self.queued.take() {
            if old.trigger == Trigger::Manual {
                due = due.min(old_due);
            }
            paths = merge_paths(&old.paths, paths);
            old.supersede();
            changed.push(old);
        }

        let job = BuildJob::new(self.next_seq, trigger, self.version).with_paths(paths);
        self.next_seq += 1;
        self.queued = Some((job.clone(), due));
        changed.push(job);
        changed
    }
}

/// Union of two path sets, where an empty set is the whole site.
fn merge_paths(a: &[String], b: Vec<String>) -> Vec<String> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut merged = b;
    merged.extend(a.iter().cloned());
    merged.sort();
    merged.dedup();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{Diagnostic, Severity};
    use proptest::prelude::*;

    fn config() -> BuildConfig {
        BuildConfig {
            coalesce_ms: 400,
            retention_secs: 600,
            retention_max: 3,
            on_startup: false,
        }
    }

    fn scheduler() -> BuildScheduler {
        BuildScheduler::new(&config(), BuildHistory::default())
    }

    fn ok() -> RunOutcome {
        RunOutcome {
            success: true,
            exit_code: Some(0),
            ..Default::default()
        }
    }

    fn failed() -> RunOutcome {
        RunOutcome {
            exit_code: Some(1),
            diagnostics: vec![Diagnostic::error("boom")],
            ..Default::default()
        }
    }

    const WINDOW: Duration = Duration::from_millis(400);

    /// Queue a change and start it once its window is over.
    fn start_at(s: &mut BuildScheduler, version: u64, now: Instant) -> BuildJob {
        s.on_change(version, Trigger::UiEdit, now);
        s.poll_start(now + WINDOW).unwrap()
    }

    #[test]
    fn test_change_waits_for_window() {
        let mut s = scheduler();
        let now = Instant::now();

        let changed = s.on_change(1, Trigger::UiEdit, now);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].state, JobState::Queued);
        assert_eq!(s.state(), SiteState::Dirty);

        assert!(s.poll_start(now).is_none());
        assert_eq!(s.next_deadline(), Some(now + WINDOW));

        let job = s.poll_start(now + WINDOW).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(s.state(), SiteState::Building);
    }

    #[test]
    fn test_rapid_changes_coalesce() {
        let mut s = scheduler();
        let now = Instant::now();

        s.on_change(1, Trigger::UiEdit, now);
        let changed = s.on_change(2, Trigger::WatcherChange, now + Duration::from_millis(100));
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].state, JobState::Superseded);
        assert_eq!(changed[1].version, 2);

        // Window restarted by the second change.
        assert!(s.poll_start(now + WINDOW).is_none());
        let job = s.poll_start(now + WINDOW + Duration::from_millis(100)).unwrap();
        assert_eq!(job.version, 2);
        assert_eq!(job.seq, 2);
    }

    #[test]
    fn test_success_makes_clean() {
        let mut s = scheduler();
        let now = Instant::now();
        let job = start_at(&mut s, 1, now);

        let changed = s.on_finished(job.seq, ok(), now);
        assert_eq!(changed[0].state, JobState::Succeeded);
        assert_eq!(s.state(), SiteState::Clean);
        assert_eq!(s.latest().unwrap().seq, job.seq);
    }

    #[test]
    fn test_failure_stays_dirty() {
        let mut s = scheduler();
        let now = Instant::now();
        let job = start_at(&mut s, 1, now);

        let changed = s.on_finished(job.seq, failed(), now);
        assert_eq!(changed[0].state, JobState::Failed);
        assert_eq!(changed[0].diagnostics[0].severity, Severity::Error);
        assert_eq!(s.state(), SiteState::Dirty);
        s.on_released(job.seq);

        // A failed build does not block the next one.
        let next = start_at(&mut s, 2, now);
        assert_eq!(next.version, 2);
    }

    #[test]
    fn test_change_while_building_supersedes() {
        let mut s = scheduler();
        let now = Instant::now();
        let job = start_at(&mut s, 1, now);

        assert!(s.on_change(2, Trigger::UiEdit, now).is_empty());
        assert_eq!(s.state(), SiteState::DirtyWhileBuilding);
        assert!(s.next_deadline().is_none());

        let changed = s.on_finished(job.seq, ok(), now);
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].state, JobState::Superseded);
        assert_eq!(changed[1].state, JobState::Queued);
        assert_eq!(changed[1].version, 2);
        assert!(s.latest().is_none(), "superseded result must not surface");
        assert_eq!(s.state(), SiteState::Dirty);

        // One subprocess at a time: nothing starts before release.
        assert!(s.poll_start(now).is_none());
        s.on_released(job.seq);
        let next = s.poll_start(now).unwrap();
        assert_eq!(next.version, 2);
    }

    #[test]
    fn test_request_build_is_idempotent() {
        let mut s = scheduler();
        let now = Instant::now();

        let (first, changed) = s.request_build(3, vec![], now);
        assert_eq!(changed.len(), 1);
        assert_eq!(first.trigger, Trigger::Manual);
        let (again, changed) = s.request_build(3, vec![], now);
        assert_eq!(again.seq, first.seq);
        assert!(changed.is_empty());

        // Manual requests skip the window.
        let running = s.poll_start(now).unwrap();
        let (during, changed) = s.request_build(3, vec![], now);
        assert_eq!(during.seq, running.seq);
        assert!(changed.is_empty());
    }

    #[test]
    fn test_request_build_after_inert_change_rebuilds() {
        let mut s = scheduler();
        let now = Instant::now();
        let running = start_at(&mut s, 1, now);

        s.on_inert_change(2);
        let (job, _) = s.request_build(2, vec![], now);
        assert_ne!(job.seq, running.seq);
        assert_eq!(job.version, 2);
        assert_eq!(s.state(), SiteState::DirtyWhileBuilding);

        let changed = s.on_finished(running.seq, ok(), now);
        assert_eq!(changed.len(), 1, "queued manual job is reused");
        assert_eq!(changed[0].state, JobState::Superseded);
    }

    #[test]
    fn test_edit_does_not_delay_manual_request() {
        let mut s = scheduler();
        let now = Instant::now();

        s.request_build(1, vec![], now);
        s.on_change(2, Trigger::UiEdit, now);
        assert_eq!(s.next_deadline(), Some(now));
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_partial_requests_merge() {
        let mut s = scheduler();
        let now = Instant::now();

        let (a, _) = s.request_build(1, paths(&["content/a.md"]), now);
        assert_eq!(a.paths, paths(&["content/a.md"]));
        let (again, changed) = s.request_build(1, paths(&["content/a.md"]), now);
        assert_eq!(again.seq, a.seq);
        assert!(changed.is_empty());

        let (ab, changed) = s.request_build(1, paths(&["content/b.md"]), now);
        assert_eq!(ab.paths, paths(&["content/a.md", "content/b.md"]));
        assert_eq!(changed[0].seq, a.seq);
        assert_eq!(changed[0].state, JobState::Superseded);

        let (full, _) = s.request_build(1, vec![], now);
        assert!(!full.is_partial());
        let (covered, changed) = s.request_build(1, paths(&["content/c.md"]), now);
        assert_eq!(covered.seq, full.seq);
        assert!(changed.is_empty());
    }

    #[test]
    fn test_partial_success_stays_dirty() {
        let mut s = scheduler();
        let now = Instant::now();
        s.on_inert_change(1);

        s.request_build(1, paths(&["content/a.md"]), now);
        let job = s.poll_start(now).unwrap();
        s.on_finished(job.seq, ok(), now);
        assert_eq!(s.latest().unwrap().seq, job.seq);
        assert_eq!(s.state(), SiteState::Dirty);
        s.on_released(job.seq);

        // An edit always queues the whole site, absorbing a pending partial.
        s.request_build(1, paths(&["content/a.md"]), now);
        let changed = s.on_change(2, Trigger::UiEdit, now);
        assert!(!changed[1].is_partial());
    }

    #[test]
    fn test_partial_request_does_not_supersede_current_build() {
        let mut s = scheduler();
        let now = Instant::now();
        let running = start_at(&mut s, 1, now);
        s.on_finished(running.seq, ok(), now);
        s.on_released(running.seq);

        let partial = {
            s.request_build(1, paths(&["content/a.md"]), now);
            s.poll_start(now).unwrap()
        };
        let (other, _) = s.request_build(1, paths(&["content/b.md"]), now);
        assert_ne!(other.seq, partial.seq);
        assert_eq!(s.state(), SiteState::Building);

        let changed = s.on_finished(partial.seq, ok(), now);
        assert_eq!(changed[0].state, JobState::Succeeded);
    }

    #[test]
    fn test_cancel() {
        let mut s = scheduler();
        let now = Instant::now();
        s.on_change(1, Trigger::UiEdit, now);

        let cancelled = s.cancel(1).unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);
        assert!(s.next_deadline().is_none());
        assert!(matches!(s.cancel(1), Err(SiteError::NotFound(_))));

        let running = start_at(&mut s, 2, now);
        assert!(matches!(
            s.cancel(running.seq),
            Err(SiteError::Validation { .. })
        ));
    }

    #[test]
    fn test_cancel_while_building_keeps_running_result() {
        let mut s = scheduler();
        let now = Instant::now();
        let running = start_at(&mut s, 1, now);

        s.on_inert_change(2);
        let (manual, _) = s.request_build(2, vec![], now);
        assert_eq!(s.state(), SiteState::DirtyWhileBuilding);
        s.cancel(manual.seq).unwrap();
        assert_eq!(s.state(), SiteState::Building);

        let changed = s.on_finished(running.seq, ok(), now);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].state, JobState::Succeeded);
        assert!(s.status().queued.is_none(), "cancelled request must not come back");
        assert_eq!(s.latest().unwrap().seq, running.seq);
        // The tree moved past the build, so it is not clean.
        assert_eq!(s.state(), SiteState::Dirty);
    }

    #[test]
    fn test_request_build_skips_window_of_queued_edit() {
        let mut s = scheduler();
        let now = Instant::now();

        let edit = s.on_change(1, Trigger::UiEdit, now).remove(0);
        assert_eq!(s.next_deadline(), Some(now + WINDOW));

        let later = now + Duration::from_millis(50);
        let (job, changed) = s.request_build(1, vec![], later);
        assert_eq!(job.seq, edit.seq);
        assert!(changed.is_empty());
        assert_eq!(s.next_deadline(), Some(later));
        assert_eq!(s.poll_start(later).unwrap().seq, edit.seq);
    }

    #[test]
    fn test_unknown_result_ignored() {
        let mut s = scheduler();
        assert!(s.on_finished(42, ok(), Instant::now()).is_empty());
    }

    #[test]
    fn test_timeout_keeps_slot_until_released() {
        let mut s = scheduler();
        let now = Instant::now();
        let job = start_at(&mut s, 1, now);

        let timed_out = RunOutcome {
            timed_out: true,
            ..Default::default()
        };
        s.on_finished(job.seq, timed_out, now);
        assert_eq!(s.latest().unwrap().state, JobState::Failed);

        s.on_change(2, Trigger::UiEdit, now);
        assert!(s.poll_start(now + WINDOW).is_none());
        s.on_released(job.seq);
        assert!(s.poll_start(now + WINDOW).is_some());
    }

    #[test]
    fn test_seq_continues_from_history() {
        let history = BuildHistory {
            last_seq: 41,
            latest: None,
        };
        let mut s = BuildScheduler::new(&config(), history);
        let changed = s.on_change(1, Trigger::Startup, Instant::now());
        assert_eq!(changed[0].seq, 42);
        assert_eq!(s.history().last_seq, 42);
    }

    #[test]
    fn test_gc_retention() {
        let mut s = scheduler();
        let now = Instant::now();
        for version in 1..=5 {
            let job = start_at(&mut s, version, now);
            s.on_finished(job.seq, ok(), now);
            s.on_released(job.seq);
        }
        let newest = s.recent.back().and_then(|job| job.finished_at).unwrap();

        assert_eq!(s.gc(newest), 2, "capped at retention_max");
        assert_eq!(s.status().recent.len(), 3);
        assert_eq!(s.gc(newest + 601_000), 3, "expired");
        assert!(s.status().latest.is_some(), "latest outlives retention");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Edit,
        Inert,
        Request,
        RequestPaths(u8),
        Cancel,
        Tick(u64),
        Finish(u8),
        Release,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Edit),
            Just(Op::Inert),
            Just(Op::Request),
            (0u8..3).prop_map(Op::RequestPaths),
            Just(Op::Cancel),
            (0u64..600).prop_map(Op::Tick),
            (0u8..3).prop_map(Op::Finish),
            Just(Op::Release),
        ]
    }

    proptest! {
        /// Whatever order mutations, requests and runner events arrive in,
        /// a job only starts while no generator process is alive.
        #[test]
        fn prop_one_build_at_a_time(ops in prop::collection::vec(op(), 1..60)) {
            let mut s = scheduler();
            let mut now = Instant::now();
            let mut version = 0;
            // Process started by poll_start and not yet released
            let mut alive: Option<u64> = None;

            for op in ops {
                match op {
                    Op::Edit => {
                        version += 1;
                        s.on_change(version, Trigger::UiEdit, now);
                    }
                    Op::Inert => {
                        version += 1;
                        s.on_inert_change(version);
                    }
                    Op::Request => {
                        let (job, _) = s.request_build(version, vec![], now);
                        prop_assert_eq!(job.version, version);
                    }
                    Op::RequestPaths(n) => {
                        let wanted = vec![format!("content/{n}.md")];
                        let (job, _) = s.request_build(version, wanted.clone(), now);
                        prop_assert!(job.covers(&wanted));
                    }
                    Op::Cancel => {
                        if let Some(job) = s.status().queued {
                            prop_assert_eq!(s.cancel(job.seq).unwrap().state, JobState::Cancelled);
                        }
                    }
                    Op::Tick(ms) => {
                        now += Duration::from_millis(ms);
                        if let Some(job) = s.poll_start(now) {
                            prop_assert!(alive.is_none(), "#{} started next to #{:?}", job.seq, alive);
                            alive = Some(job.seq);
                        }
                    }
                    Op::Finish(kind) => {
                        if let Some(job) = s.status().running {
                            let outcome = match kind {
                                0 => ok(),
                                1 => failed(),
                                _ => RunOutcome { timed_out: true, ..Default::default() },
                            };
                            s.on_finished(job.seq, outcome, now);
                        }
                    }
                    Op::Release => {
                        // Released always follows Finished.
                        if let Some(seq) = alive
                            && s.status().running.is_none_or(|job| job.seq != seq)
                        {
                            s.on_released(seq);
                            alive = None;
                        }
                    }
                }

                let status = s.status();
                if let Some(running) = &status.running {
                    prop_assert_eq!(alive, Some(running.seq));
                    prop_assert_eq!(running.state, JobState::Running);
                }
                if alive.is_some() {
                    prop_assert!(s.poll_start(now + Duration::from_secs(10)).is_none());
                    prop_assert!(s.next_deadline().is_none());
                }
                if let Some(queued) = &status.queued {
                    prop_assert_eq!(queued.state, JobState::Queued);
                    prop_assert!(queued.version <= version);
                }
            }
        }
    }
}
