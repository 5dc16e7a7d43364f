//! core::config
//!
//! Harness configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order:
//! 1. `$GITRIG_CONFIG` if set
//! 2. `<repo>/gitrig.toml`
//!
//! Every field has a default, so a missing file is not an error. An unknown
//! key *is* an error: configuration typos are fixture-authoring bugs and
//! must fail fast rather than silently fall back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use gitrig::core::config::HarnessConfig;
//! use std::path::Path;
//!
//! let config = HarnessConfig::load(Path::new("/path/to/repo")).unwrap();
//! println!("runner: {}", config.runner.binary);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "GITRIG_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },
}

/// Workflow-runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RunnerConfig {
    /// Binary invoked to run a workflow inside a container.
    pub binary: String,
    /// Default job filter passed to the runner, if any.
    pub job: Option<String>,
    /// In-container mount point for the exported test state.
    pub container_state_dir: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            binary: "act".to_string(),
            job: None,
            container_state_dir: "/test-state".to_string(),
        }
    }
}

/// Repository-relative paths the harness reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PathsConfig {
    /// Directory holding test fixture documents.
    pub fixtures_dir: PathBuf,
    /// Directory holding workflow definitions under test.
    pub workflows_dir: PathBuf,
    /// Directory holding event payload fixtures.
    pub events_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: PathBuf::from("tests/fixtures"),
            workflows_dir: PathBuf::from(".github/workflows"),
            events_dir: PathBuf::from("tests/events"),
        }
    }
}

/// Snapshot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SnapshotConfig {
    /// Record remote-tracking branches in backups.
    pub include_remote_branches: bool,
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HarnessConfig {
    pub runner: RunnerConfig,
    pub paths: PathsConfig,
    pub snapshot: SnapshotConfig,
}

impl HarnessConfig {
    /// Load configuration for a repository, applying defaults when no file
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a config file exists but cannot be read or
    /// parsed (including unknown keys).
    pub fn load(repo_dir: &Path) -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(p) => PathBuf::from(p),
            None => repo_dir.join("gitrig.toml"),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(&path)
    }

    /// Load configuration from an explicit file path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(tmp.path()).unwrap();
        assert_eq!(config.runner.binary, "act");
        assert_eq!(config.runner.container_state_dir, "/test-state");
        assert!(!config.snapshot.include_remote_branches);
    }

    #[test]
    fn parses_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gitrig.toml");
        fs::write(&path, "[runner]\nbinary = \"act-cli\"\njob = \"release\"\n").unwrap();
        let config = HarnessConfig::load_file(&path).unwrap();
        assert_eq!(config.runner.binary, "act-cli");
        assert_eq!(config.runner.job.as_deref(), Some("release"));
        // Untouched sections keep defaults.
        assert_eq!(config.paths.workflows_dir, PathBuf::from(".github/workflows"));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gitrig.toml");
        fs::write(&path, "[runner]\nbinry = \"act\"\n").unwrap();
        let err = HarnessConfig::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
