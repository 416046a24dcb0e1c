//! Terminal output.
//!
//! - `log!("module"; ...)` prints one line behind a colored `[module]` prefix
//! - `debug!` does the same, only with `--verbose`
//! - the status line shows the latest build result and overwrites the
//!   previous one, unless regular log lines were printed in between
//!
//! ```ignore
//! log!("rpc"; "listening on ws://{}", addr);
//! debug!("watch"; "batch of {} changes", n);
//! logger::status_success("build #4 succeeded in 812ms");
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::io::{Write, stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Line count of the status block currently at the bottom of the terminal.
/// Zero once anything else has been printed below it.
static STATUS_LINES: Mutex<usize> = Mutex::new(0);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let mut status = STATUS_LINES.lock();
    let mut stdout = stdout().lock();
    writeln!(stdout, "{} {message}", prefix(module)).ok();
    stdout.flush().ok();
    *status = 0;
}

fn prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "serve" | "rpc" | "preview" => prefix.bright_blue().bold().to_string(),
        "watch" => prefix.bright_green().bold().to_string(),
        "build" | "reconcile" => prefix.bright_magenta().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Status line
// ============================================================================

pub fn status_success(message: &str) {
    show_status(&"✓".green().to_string(), message);
}

/// Summary line plus optional detail (first diagnostic, error chain).
pub fn status_error(summary: &str, detail: &str) {
    let message = if detail.is_empty() {
        summary.to_string()
    } else {
        format!("{summary}\n{}", indent(detail))
    };
    show_status(&"✗".red().to_string(), &message);
}

fn show_status(symbol: &str, message: &str) {
    let mut lines = STATUS_LINES.lock();
    let mut stdout = stdout().lock();

    if let Ok(previous) = u16::try_from(*lines)
        && previous > 0
    {
        execute!(stdout, cursor::MoveUp(previous), Clear(ClearType::FromCursorDown)).ok();
    }

    let timestamp = format!("[{}]", clock()).dimmed().to_string();
    writeln!(stdout, "{timestamp} {symbol} {message}").ok();
    stdout.flush().ok();

    *lines = line_count(message);
}

fn indent(detail: &str) -> String {
    detail
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn line_count(message: &str) -> usize {
    message.matches('\n').count() + 1
}

/// Wall-clock time of day (UTC) as HH:MM:SS.
fn clock() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
}
