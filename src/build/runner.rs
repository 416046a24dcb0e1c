//! Generator subprocess supervision.
//!
//! One [`BuildRunner::spawn`] call drives one process to the end and
//! reports twice: [`RunnerEvent::Finished`] as soon as the job has a
//! result, and [`RunnerEvent::Released`] once the process is really gone.
//! The two differ only on timeout, where the job is failed immediately
//! but the process still gets its grace period.
//!
//! A run stopped through its [`RunHandle`] gets the same treatment: SIGTERM,
//! the grace period, and only then SIGKILL.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::diagnostics::{Diagnostic, DiagnosticParser};
use super::job::{BuildJob, RunOutcome};
use crate::config::SiteConfig;
use crate::content::SiteTree;

#[derive(Debug)]
pub enum RunnerEvent {
    /// The job has a result (the process may still be shutting down).
    Finished { seq: u64, outcome: RunOutcome },
    /// The process is gone and the slot is free.
    Released { seq: u64 },
}

/// Owner's side of one run.
#[derive(Debug)]
pub struct RunHandle {
    pub seq: u64,
    stop: oneshot::Sender<()>,
}

impl RunHandle {
    /// Ask the generator to exit. The run still reports `Finished` and
    /// `Released` as usual.
    pub fn stop(self) {
        let _ = self.stop.send(());
    }
}

/// How the wait on the generator ended.
enum Exit {
    Done(std::io::Result<ExitStatus>),
    TimedOut,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct BuildRunner {
    root: PathBuf,
    output_dir: PathBuf,
    content_dir: PathBuf,
    /// Content directory relative to root, for diagnostic path matching
    content_rel: String,
    command: Vec<String>,
    timeout: Duration,
    grace: Duration,
    max_diagnostics: usize,
}

impl BuildRunner {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            root: config.root.clone(),
            output_dir: config.output_dir(),
            content_dir: config.content_dir(),
            content_rel: config.content.dir.trim_matches('/').to_string(),
            command: config.generator.command.clone(),
            timeout: Duration::from_secs(config.generator.timeout_secs),
            grace: Duration::from_secs(config.generator.grace_secs),
            max_diagnostics: config.generator.max_diagnostics,
        }
    }

    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    /// Run `job` against `snapshot` in its own task.
    pub fn spawn(
        &self,
        job: &BuildJob,
        snapshot: &SiteTree,
        events: mpsc::UnboundedSender<RunnerEvent>,
    ) -> RunHandle {
        let known = snapshot
            .iter()
            .filter(|node| !node.is_dir())
            .map(|node| node.path.clone());
        let parser = DiagnosticParser::new(&self.root, &self.content_rel, known, self.max_diagnostics);

        let runner = self.clone();
        let seq = job.seq;
        let paths = job.paths.clone();
        let (stop, stop_rx) = oneshot::channel();
        crate::debug!("build"; "#{} starting `{}` (v{})", seq, runner.program(), job.version);
        tokio::spawn(async move { runner.run(seq, paths, parser, events, stop_rx).await });
        RunHandle { seq, stop }
    }

    async fn run(
        self,
        seq: u64,
        paths: Vec<String>,
        parser: DiagnosticParser,
        events: mpsc::UnboundedSender<RunnerEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let finish = |outcome: RunOutcome| {
            let _ = events.send(RunnerEvent::Finished { seq, outcome });
        };

        let mut child = match self.start(&paths) {
            Ok(child) => child,
            Err(e) => {
                finish(RunOutcome {
                    diagnostics: vec![Diagnostic::error(format!("{e:#}"))],
                    ..Default::default()
                });
                let _ = events.send(RunnerEvent::Released { seq });
                return;
            }
        };

        let parser = Arc::new(Mutex::new(parser));
        let pumps: Vec<_> = [
            child.stdout.take().map(|out| pump(out, Arc::clone(&parser))),
            child.stderr.take().map(|err| pump(err, Arc::clone(&parser))),
        ]
        .into_iter()
        .flatten()
        .collect();

        // A dropped handle is not a stop request.
        let exit = tokio::select! {
            status = tokio::time::timeout(self.timeout, child.wait()) => match status {
                Ok(status) => Exit::Done(status),
                Err(_) => Exit::TimedOut,
            },
            Ok(()) = &mut stop => Exit::Stopped,
        };

        match exit {
            Exit::Done(status) => {
                drain(pumps, self.grace).await;
                finish(completed(status, &parser.lock()));
            }
            Exit::TimedOut => {
                let mut diagnostics = parser.lock().snapshot();
                diagnostics.push(Diagnostic::error(format!(
                    "build timed out after {}s",
                    self.timeout.as_secs()
                )));
                finish(RunOutcome {
                    timed_out: true,
                    diagnostics,
                    ..Default::default()
                });
                self.shut_down(&mut child).await;
                drain(pumps, self.grace).await;
            }
            Exit::Stopped => {
                crate::debug!("build"; "#{} stopping generator", seq);
                let status = self.shut_down(&mut child).await;
                drain(pumps, self.grace).await;
                let outcome = match status {
                    Some(status) => completed(Ok(status), &parser.lock()),
                    None => {
                        let mut diagnostics = parser.lock().snapshot();
                        diagnostics.push(Diagnostic::error(format!(
                            "generator killed after ignoring SIGTERM for {}s",
                            self.grace.as_secs()
                        )));
                        RunOutcome {
                            diagnostics,
                            ..Default::default()
                        }
                    }
                };
                finish(outcome);
            }
        }

        let _ = events.send(RunnerEvent::Released { seq });
    }

    fn start(&self, paths: &[String]) -> Result<Child> {
        let (program, args) = self
            .command
            .split_first()
            .context("generator command is empty")?;
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let vars = self.vars(paths);
        let mut cmd = Command::new(substitute(program, &vars));
        cmd.args(expand_args(args, paths, &vars))
            .envs(vars.iter().map(|(k, v)| (*k, v.as_str())))
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn()
            .with_context(|| format!("failed to spawn `{program}`"))
    }

    /// `PATHS` is newline-separated and empty for a full build.
    fn vars(&self, paths: &[String]) -> [(&'static str, String); 4] {
        [
            ("SITE_DIR", self.root.to_string_lossy().into_owned()),
            ("OUTPUT_DIR", self.output_dir.to_string_lossy().into_owned()),
            ("CONTENT_DIR", self.content_dir.to_string_lossy().into_owned()),
            ("PATHS", paths.join("\n")),
        ]
    }

    /// Ask politely, then insist after the grace period.
    ///
    /// Returns the exit status if the generator left on its own.
    async fn shut_down(&self, child: &mut Child) -> Option<ExitStatus> {
        terminate(child);
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(status) => status.ok(),
            Err(_) => {
                crate::debug!("build"; "generator ignored SIGTERM, killing");
                let _ = child.kill().await;
                None
            }
        }
    }
}

/// Turn an exit status into an outcome.
fn completed(status: std::io::Result<ExitStatus>, parser: &DiagnosticParser) -> RunOutcome {
    let mut diagnostics = parser.snapshot();
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            diagnostics.push(Diagnostic::error(format!("failed to wait for generator: {e}")));
            return RunOutcome {
                diagnostics,
                ..Default::default()
            };
        }
    };

    let success = status.success();
    if !success && !parser.has_errors() {
        let summary = match status.code() {
            Some(code) => format!("generator exited with status {code}"),
            None => "generator was terminated by a signal".to_string(),
        };
        diagnostics.push(Diagnostic::error(summary));
    }

    RunOutcome {
        success,
        exit_code: status.code(),
        timed_out: false,
        diagnostics,
    }
}

/// An argument that is exactly `$PATHS` becomes one argument per path
/// (none for a full build); every other argument gets its placeholders
/// substituted.
fn expand_args(args: &[String], paths: &[String], vars: &[(&'static str, String)]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len() + paths.len());
    for arg in args {
        if arg == "$PATHS" {
            out.extend(paths.iter().cloned());
        } else {
            out.push(substitute(arg, vars));
        }
    }
    out
}

fn substitute(arg: &str, vars: &[(&'static str, String)]) -> String {
    vars.iter().fold(arg.to_string(), |acc, (name, value)| {
        acc.replace(&format!("${name}"), value)
    })
}

/// Feed one output stream into the parser, line by line.
fn pump<R>(reader: R, parser: Arc<Mutex<DiagnosticParser>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => parser.lock().push_line(&String::from_utf8_lossy(&buf)),
            }
        }
    })
}

/// Wait for the pumps to hit EOF, but not forever: a grandchild may
/// still hold the pipes open.
async fn drain(pumps: Vec<JoinHandle<()>>, grace: Duration) {
    let all = async {
        for pump in pumps {
            let _ = pump.await;
        }
    };
    if tokio::time::timeout(grace, all).await.is_err() {
        crate::debug!("build"; "output still open after exit, not waiting");
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: signalling our own child process by pid
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::build::diagnostics::Severity;
    use crate::build::job::Trigger;
    use crate::config::test_config_at;
    use crate::content::ContentModel;
    use std::time::Instant;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        runner: BuildRunner,
        model: ContentModel,
    }

    fn fixture(generator: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = crate::utils::path::normalize_path(dir.path());
        fs::create_dir_all(root.join("content")).unwrap();
        fs::write(root.join("content/post1.md"), "Title: One\n\nBody").unwrap();

        let config = test_config_at(&root, &format!("[generator]\n{generator}"));
        let model = ContentModel::new(&config);
        model.scan();
        Fixture {
            _dir: dir,
            runner: BuildRunner::new(&config),
            model,
        }
    }

    fn job(fixture: &Fixture) -> BuildJob {
        BuildJob::new(1, Trigger::Manual, fixture.model.version())
    }

    /// Run one job, returning its outcome and the event order.
    async fn run(fixture: &Fixture) -> (RunOutcome, Vec<&'static str>) {
        run_job(fixture, job(fixture)).await
    }

    async fn run_job(fixture: &Fixture, job: BuildJob) -> (RunOutcome, Vec<&'static str>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // Dropping the handle must not stop the run.
        drop(fixture.runner.spawn(&job, &fixture.model.snapshot(), tx));
        collect(rx).await
    }

    /// Start a job and stop it after `after`.
    async fn run_and_stop(fixture: &Fixture, after: Duration) -> (RunOutcome, Vec<&'static str>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = fixture.runner.spawn(&job(fixture), &fixture.model.snapshot(), tx);
        assert_eq!(handle.seq, 1);
        tokio::time::sleep(after).await;
        handle.stop();
        collect(rx).await
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<RunnerEvent>) -> (RunOutcome, Vec<&'static str>) {
        let mut order = Vec::new();
        let mut outcome = None;
        while let Some(event) = rx.recv().await {
            match event {
                RunnerEvent::Finished { seq, outcome: o } => {
                    assert_eq!(seq, 1);
                    order.push("finished");
                    outcome = Some(o);
                }
                RunnerEvent::Released { .. } => {
                    order.push("released");
                    break;
                }
            }
        }
        (outcome.unwrap(), order)
    }

    #[tokio::test]
    async fn test_success_with_warning() {
        let f = fixture(r#"command = ["sh", "-c", "echo 'WARNING: no SITEURL'; exit 0"]"#);
        let (outcome, order) = run(&f).await;

        assert_eq!(order, vec!["finished", "released"]);
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_failure_maps_source_path() {
        let f = fixture(
            r#"command = ["sh", "-c", "echo 'ERROR Could not process ./post1.md' >&2; exit 3"]"#,
        );
        let (outcome, _) = run(&f).await;

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        let error = &outcome.diagnostics[0];
        assert_eq!(error.severity, Severity::Error);
        assert_eq!(error.source.as_deref(), Some("content/post1.md"));
        // The generator reported its own error, no summary needed.
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_silent_failure_gets_summary() {
        let f = fixture(r#"command = ["sh", "-c", "exit 1"]"#);
        let (outcome, _) = run(&f).await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.diagnostics.last().unwrap().message,
            "generator exited with status 1"
        );
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let f = fixture(r#"command = ["sitedesk-no-such-generator-xyz"]"#);
        let (outcome, order) = run(&f).await;

        assert_eq!(order, vec!["finished", "released"]);
        assert!(!outcome.success);
        assert!(outcome.diagnostics[0].message.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_placeholders_and_env() {
        let f = fixture(
            r#"command = ["sh", "-c", 'test "$1" = "$(printenv SITE_DIR)" && test -d "$(printenv OUTPUT_DIR)"', "sh", "$SITE_DIR"]"#,
        );
        let (outcome, _) = run(&f).await;
        assert!(outcome.success, "{:?}", outcome.diagnostics);
    }

    #[tokio::test]
    async fn test_timeout_fails_then_releases() {
        let f = fixture(
            "command = [\"sh\", \"-c\", \"echo started; exec sleep 30\"]\ntimeout_secs = 1\ngrace_secs = 1",
        );
        let start = Instant::now();
        let (outcome, order) = run(&f).await;

        assert_eq!(order, vec!["finished", "released"]);
        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert_eq!(
            outcome.diagnostics.last().unwrap().message,
            "build timed out after 1s"
        );
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_stop_sends_sigterm_first() {
        let f = fixture(
            r#"command = ["sh", "-c", "trap 'kill $!; echo bye; exit 0' TERM; sleep 30 & wait"]
grace_secs = 5"#,
        );
        let start = Instant::now();
        let (outcome, order) = run_and_stop(&f, Duration::from_millis(300)).await;

        assert_eq!(order, vec!["finished", "released"]);
        assert!(outcome.success, "{:?}", outcome.diagnostics);
        assert_eq!(outcome.diagnostics[0].message, "bye");
        assert!(start.elapsed() < Duration::from_secs(5), "exited within the grace period");
    }

    #[tokio::test]
    async fn test_stop_kills_after_grace() {
        let f = fixture(
            r#"command = ["sh", "-c", "trap '' TERM; exec sleep 20"]
grace_secs = 1"#,
        );
        let start = Instant::now();
        let (outcome, order) = run_and_stop(&f, Duration::from_millis(200)).await;

        assert_eq!(order, vec!["finished", "released"]);
        assert!(!outcome.success);
        assert_eq!(
            outcome.diagnostics.last().unwrap().message,
            "generator killed after ignoring SIGTERM for 1s"
        );
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_paths_placeholder() {
        let f = fixture(
            r#"command = ["sh", "-c", 'test "$#" = 2 && test "$1" = content/a.md && test "$(printenv PATHS | grep -c md)" = 2', "sh", "$PATHS"]"#,
        );
        let partial = job(&f).with_paths(vec!["content/a.md".into(), "content/b.md".into()]);
        let (outcome, _) = run_job(&f, partial).await;
        assert!(outcome.success, "{:?}", outcome.diagnostics);

        let f = fixture(r#"command = ["sh", "-c", 'test "$#" = 0 && test -z "$PATHS"', "sh", "$PATHS"]"#);
        let (outcome, _) = run(&f).await;
        assert!(outcome.success, "{:?}", outcome.diagnostics);
    }

    #[test]
    fn test_expand_args() {
        let vars = [("OUTPUT_DIR", "/s/out".to_string())];
        let args: Vec<String> = ["-o", "$OUTPUT_DIR", "$PATHS"].map(String::from).into();
        let paths = vec!["content/a.md".to_string()];
        assert_eq!(expand_args(&args, &paths, &vars), ["-o", "/s/out", "content/a.md"]);
        assert_eq!(expand_args(&args, &[], &vars), ["-o", "/s/out"]);
    }

    #[test]
    fn test_substitute() {
        let vars = [("SITE_DIR", "/s".to_string()), ("OUTPUT_DIR", "/s/out".to_string())];
        assert_eq!(substitute("-o=$OUTPUT_DIR", &vars), "-o=/s/out");
        assert_eq!(substitute("$SITE_DIR/x", &vars), "/s/x");
        assert_eq!(substitute("plain", &vars), "plain");
    }
}
