//! Dotted config field path.

use owo_colors::OwoColorize;
use std::fmt;

/// Location of a value in `sitedesk.toml`, e.g. `generator.timeout_secs`.
///
/// Each section exposes its paths as associated constants so diagnostics
/// cannot drift from the actual field names:
///
/// ```ignore
/// diag.error(GeneratorConfig::TIMEOUT, "must be greater than zero");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(&'static str);

impl FieldPath {
    #[inline]
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// Top-level section name (`generator` for `generator.command`).
    pub fn section(&self) -> &'static str {
        self.0.split('.').next().unwrap_or(self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        self.0
    }
}
