//! Heuristic diagnostics from generator output.
//!
//! Generators print whatever they like, so nothing here is exact:
//!
//! - a leading severity keyword (optionally after a `[timestamp]`) sets
//!   the severity, and the rest of the line is the message
//! - `path:line[:col]` pins a source location
//! - otherwise any token naming a known tree path becomes the source
//! - lines matching none of this become plain `info` with no source

use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Site-relative path the message is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: None,
            line: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn at(mut self, source: impl Into<String>, line: Option<u32>) -> Self {
        self.source = Some(source.into());
        self.line = line;
        self
    }
}

static ANSI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

static SEVERITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\[[^\]]*\]\s*)*(critical|fatal|error|warning|warn|info|debug)\b[:\s]*")
        .unwrap()
});

static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w./\\-]+\.\w+):(\d+)(?::\d+)?").unwrap());

/// Line-by-line parser over both output streams.
pub struct DiagnosticParser {
    /// Absolute site root with a trailing slash
    root_prefix: String,
    /// Content directory relative to the root, with a trailing slash
    content_prefix: String,
    known: FxHashSet<String>,
    max: usize,
    diagnostics: Vec<Diagnostic>,
    omitted: usize,
}

impl DiagnosticParser {
    pub fn new(
        root: &Path,
        content_dir: &str,
        known: impl IntoIterator<Item = String>,
        max: usize,
    ) -> Self {
        let root = root.to_string_lossy().replace('\\', "/");
        Self {
            root_prefix: format!("{}/", root.trim_end_matches('/')),
            content_prefix: if content_dir.is_empty() {
                String::new()
            } else {
                format!("{content_dir}/")
            },
            known: known.into_iter().collect(),
            max,
            diagnostics: Vec::new(),
            omitted: 0,
        }
    }

    pub fn push_line(&mut self, raw: &str) {
        let line = ANSI.replace_all(raw, "");
        let line = line.trim_end();
        if line.trim().is_empty() {
            return;
        }
        let diagnostic = self.parse(line);
        if self.diagnostics.len() >= self.max {
            self.omitted += 1;
            match self.displaceable(diagnostic.severity) {
                Some(index) => {
                    self.diagnostics.remove(index);
                }
                None => return,
            }
        }
        self.diagnostics.push(diagnostic);
    }

    /// Once the cap is hit, a line may only take the place of the oldest
    /// entry of the lowest severity below its own.
    fn displaceable(&self, incoming: Severity) -> Option<usize> {
        let lowest = self.diagnostics.iter().map(|d| d.severity).min()?;
        if lowest >= incoming {
            return None;
        }
        self.diagnostics.iter().position(|d| d.severity == lowest)
    }

    fn parse(&self, line: &str) -> Diagnostic {
        let Some(caps) = SEVERITY.captures(line) else {
            return Diagnostic::info(line.trim());
        };

        let severity = match caps[1].to_ascii_lowercase().as_str() {
            "critical" | "fatal" | "error" => Severity::Error,
            "warning" | "warn" => Severity::Warning,
            _ => Severity::Info,
        };
        let rest = line[caps.get(0).map_or(0, |m| m.end())..].trim();
        let message = if rest.is_empty() { line.trim() } else { rest };
        let diagnostic = Diagnostic::new(severity, message);

        if let Some(loc) = LOCATION.captures(message)
            && let Some(source) = self.resolve(&loc[1])
        {
            return diagnostic.at(source, loc[2].parse().ok());
        }

        let mentioned = message
            .split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '(' | ')' | ','))
            .map(|token| token.trim_end_matches([':', '.']))
            .find_map(|token| self.resolve(token));
        match mentioned {
            Some(source) => diagnostic.at(source, None),
            None => diagnostic,
        }
    }

    /// Map a path as printed by the generator to a known tree path.
    fn resolve(&self, printed: &str) -> Option<String> {
        let printed = printed.replace('\\', "/");
        let rel = printed
            .strip_prefix(&self.root_prefix)
            .unwrap_or(&printed)
            .trim_start_matches("./");
        if rel.is_empty() {
            return None;
        }

        if self.known.contains(rel) {
            return Some(rel.to_string());
        }
        // Generators often print paths relative to the content directory.
        let in_content = format!("{}{rel}", self.content_prefix);
        self.known.contains(&in_content).then_some(in_content)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Current diagnostics without consuming the parser.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        let mut out = self.diagnostics.clone();
        if self.omitted > 0 {
            out.push(Diagnostic::info(format!(
                "{} more line(s) of output omitted",
                self.omitted
            )));
        }
        out
    }
}
