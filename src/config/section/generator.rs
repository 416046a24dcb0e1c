//! `[generator]` section configuration.
//!
//! The external site generator run for every build.
//!
//! ```toml
//! [generator]
//! command = ["pelican", "$CONTENT_DIR", "-o", "$OUTPUT_DIR", "-s", "pelicanconf.py"]
//! timeout_secs = 120      # Build is failed after this long
//! grace_secs = 5          # SIGTERM first, SIGKILL after this long
//! max_diagnostics = 200   # Per build, extra lines are dropped
//! output = ".sitedesk/output"
//! cache = ".sitedesk/cache"
//! ```
//!
//! `$SITE_DIR`, `$OUTPUT_DIR` and `$CONTENT_DIR` are substituted in every
//! argument and also exported as environment variables.

use serde::{Deserialize, Serialize};

use super::check_rel_path;
use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub grace_secs: u64,
    pub max_diagnostics: usize,
    pub output: String,
    pub cache: String,
}

impl GeneratorConfig {
    pub const COMMAND: FieldPath = FieldPath::new("generator.command");
    pub const TIMEOUT: FieldPath = FieldPath::new("generator.timeout_secs");
    pub const MAX_DIAGNOSTICS: FieldPath = FieldPath::new("generator.max_diagnostics");
    pub const OUTPUT: FieldPath = FieldPath::new("generator.output");
    pub const CACHE: FieldPath = FieldPath::new("generator.cache");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        match self.command.first() {
            None => diag.error_with_hint(
                Self::COMMAND,
                "command is empty",
                "e.g. command = [\"pelican\", \"$CONTENT_DIR\", \"-o\", \"$OUTPUT_DIR\"]",
            ),
            Some(program) if which::which(program).is_err() => {
                // The program may be installed before the first build runs.
                diag.warn(Self::COMMAND, format!("`{program}` not found in PATH"));
            }
            Some(_) => {}
        }

        if self.timeout_secs == 0 {
            diag.error(Self::TIMEOUT, "must be greater than zero");
        }
        if self.max_diagnostics == 0 {
            diag.error(Self::MAX_DIAGNOSTICS, "must be greater than zero");
        }

        check_rel_path(Self::OUTPUT, &self.output, true, diag);
        check_rel_path(Self::CACHE, &self.cache, true, diag);
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: ["pelican", "$CONTENT_DIR", "-o", "$OUTPUT_DIR"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: 120,
            grace_secs: 5,
            max_diagnostics: 200,
            output: ".sitedesk/output".into(),
            cache: ".sitedesk/cache".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_generator_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.generator.command[0], "pelican");
        assert_eq!(config.generator.timeout_secs, 120);
        assert_eq!(config.generator.grace_secs, 5);
        assert_eq!(config.generator.output, ".sitedesk/output");
    }

    #[test]
    fn test_generator_command_override() {
        let config = test_parse_config("[generator]\ncommand = [\"make\", \"html\"]\ntimeout_secs = 10");
        assert_eq!(config.generator.command, vec!["make", "html"]);
        assert_eq!(config.generator.timeout_secs, 10);
    }

    #[test]
    fn test_generator_validate() {
        let config =
            test_parse_config("[generator]\ncommand = []\ntimeout_secs = 0\noutput = \"../out\"");
        let mut diag = ConfigDiagnostics::new();
        config.generator.validate(&mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["generator.command", "generator.timeout_secs", "generator.output"]
        );
    }

    #[test]
    fn test_missing_program_is_warning() {
        let config =
            test_parse_config("[generator]\ncommand = [\"surely-not-an-installed-generator\"]");
        let mut diag = ConfigDiagnostics::new();
        config.generator.validate(&mut diag);
        assert!(!diag.has_errors());
        assert_eq!(diag.warnings().len(), 1);
    }
}
