//! Site configuration management for `sitedesk.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # One module per TOML section
//! ├── types/         # ConfigError, ConfigDiagnostics, FieldPath
//! └── mod.rs         # SiteConfig (this file)
//! ```
//!
//! The config file is optional. Without one every section takes its
//! defaults, and CLI flags override whatever the file says.

pub mod section;
pub mod types;

pub use section::{
    BuildConfig, ContentConfig, GeneratorConfig, ServeConfig, SiteSectionConfig, WatchConfig,
};
pub use types::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};

use crate::{cli::Cli, log, utils::path::{normalize_path, resolve_path, to_rel}};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name, looked up in the site directory.
pub const CONFIG_FILE: &str = "sitedesk.toml";

/// Name of the persisted build history inside the cache directory.
const HISTORY_FILE: &str = "build.json";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing sitedesk.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Absolute path to the config file, whether or not it exists
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute site source directory
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub site: SiteSectionConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Load configuration for the site named on the command line.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        let root = normalize_path(&resolve_path(&cli.site_dir, &cwd));
        if !root.is_dir() {
            return Err(ConfigError::SiteDir(root).into());
        }

        let config_path = match &cli.config {
            Some(path) => normalize_path(&resolve_path(path, &cwd)),
            None => root.join(CONFIG_FILE),
        };

        let mut config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else if cli.config.is_some() {
            // An explicit -C must point at something.
            return Err(ConfigError::Io(
                config_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            )
            .into());
        } else {
            log!("config"; "no {} found, using defaults", CONFIG_FILE);
            Self::default()
        };

        config.root = root;
        config.config_path = config_path;
        config.apply_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields. The server runs unattended,
    /// so unlike a one-shot build there is no prompt to abort.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    fn apply_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.serve.interface, cli.interface.as_ref());
        Self::update_option(&mut self.serve.port, cli.port.as_ref());
        if cli.preview_port.is_some() {
            self.serve.preview_port = cli.preview_port;
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // paths
    // ========================================================================

    /// Display name: `[site] name`, else the directory name.
    pub fn site_name(&self) -> String {
        self.site.name.clone().unwrap_or_else(|| {
            self.root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "site".to_string())
        })
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root_join(&self.content.dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root_join(&self.generator.output)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root_join(&self.generator.cache)
    }

    pub fn history_file(&self) -> PathBuf {
        self.cache_dir().join(HISTORY_FILE)
    }

    /// Tree paths (relative, slash-separated) the content model never tracks.
    pub fn excluded_prefixes(&self) -> Vec<String> {
        [self.output_dir(), self.cache_dir()]
            .iter()
            .filter_map(|dir| to_rel(&self.root, dir))
            .collect()
    }

    /// Expand `~` and resolve against the site root.
    fn root_join(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path).into_owned();
        normalize_path(&resolve_path(Path::new(&expanded), &self.root))
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate every section, collecting all errors before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        self.content.validate(&mut diag);
        self.generator.validate(&mut diag);
        self.watch.validate(&mut diag);
        self.build.validate(&mut diag);
        self.serve.validate(&mut diag);

        if self.generator.output == self.generator.cache {
            diag.error(
                GeneratorConfig::CACHE,
                "output and cache must be different directories",
            );
        }

        diag.print_warnings();
        diag.into_result()
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SiteConfig {
    let (parsed, ignored) = SiteConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

/// Config rooted at `root` with defaults plus `content`.
#[cfg(test)]
pub fn test_config_at(root: &Path, content: &str) -> SiteConfig {
    let mut config = test_parse_config(content);
    config.root = root.to_path_buf();
    config.config_path = root.join(CONFIG_FILE);
    config
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(SiteConfig::from_str("[site\nname = \"x\"").is_err());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[site]\nname = \"Test\"\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = SiteConfig::parse_with_ignored(content).unwrap();
        assert_eq!(config.site.name.as_deref(), Some("Test"));
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_paths_resolved_against_root() {
        let config = test_config_at(Path::new("/srv/blog"), "");
        assert_eq!(config.content_dir(), PathBuf::from("/srv/blog/content"));
        assert_eq!(
            config.history_file(),
            PathBuf::from("/srv/blog/.sitedesk/cache/build.json")
        );
        assert_eq!(
            config.excluded_prefixes(),
            vec![".sitedesk/output".to_string(), ".sitedesk/cache".to_string()]
        );
    }

    #[test]
    fn test_site_name_falls_back_to_dir() {
        let config = test_config_at(Path::new("/srv/blog"), "");
        assert_eq!(config.site_name(), "blog");
        let config = test_config_at(Path::new("/srv/blog"), "[site]\nname = \"Notes\"");
        assert_eq!(config.site_name(), "Notes");
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "sitedesk",
            dir.path().to_str().unwrap(),
            "-p",
            "7100",
        ])
        .unwrap();
        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.serve.port, 7100);
        assert!(config.root.is_absolute());
    }

    #[test]
    fn test_load_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[serve]\nport = 7200\npreview_port = 7201\n[generator]\ncommand = [\"true\"]",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "sitedesk",
            dir.path().to_str().unwrap(),
            "--preview-port",
            "7300",
        ])
        .unwrap();
        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.serve.port, 7200);
        assert_eq!(config.serve.preview_port, Some(7300));
        assert_eq!(config.generator.command, vec!["true"]);
    }

    #[test]
    fn test_load_missing_site_dir() {
        let cli = Cli::try_parse_from(["sitedesk", "/definitely/not/a/site"]).unwrap();
        assert!(SiteConfig::load(&cli).is_err());
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[generator]\ntimeout_secs = 0").unwrap();
        let cli = Cli::try_parse_from(["sitedesk", dir.path().to_str().unwrap()]).unwrap();
        let err = SiteConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("generator.timeout_secs") || err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_output_equals_cache_rejected() {
        let config = test_parse_config("[generator]\noutput = \"out\"\ncache = \"out\"");
        assert!(config.validate().is_err());
    }
}
