//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Two configuration scopes exist:
//! - **Global**: user-level settings
//! - **Repo**: overrides stored inside a repository's git directory
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. Explicit arguments to a command (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$GITVFS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitvfs/config.toml`
//! 3. `~/.gitvfs/config.toml`
//!
//! # Example
//!
//! ```
//! use gitvfs::core::config::Config;
//! use gitvfs::core::types::MergeStrategy;
//!
//! let config = Config::from_toml_str(r#"
//!     [user]
//!     name = "Jane"
//!     email = "jane@example.com"
//! "#).unwrap();
//!
//! assert_eq!(config.user_name(), Some("Jane"));
//! assert_eq!(config.merge_strategy(), MergeStrategy::Recursive);
//! assert_eq!(config.conflict_marker_size(), 7);
//! ```

pub mod schema;

pub use schema::{GlobalConfig, MergeConfig, RepoConfig, UserConfig};

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::types::MergeStrategy;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
///
/// Accessor methods apply precedence rules: repo values override global
/// values, and both override built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if one was found)
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Default conflict marker width.
    pub const DEFAULT_MARKER_SIZE: usize = 7;

    /// Load configuration from default locations.
    ///
    /// If `git_dir` is provided, also loads `<git_dir>/gitvfs/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or hold
    /// invalid values. Missing config files are not an error.
    pub fn load(git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(&Self::global_candidates(), git_dir)
    }

    /// Load the first existing global file among `candidates`, plus the repo
    /// file under `git_dir`.
    pub fn load_from(candidates: &[PathBuf], git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = candidates.iter().find(|p| p.exists()) {
            config.global = read_config(path)?;
            config.global_path = Some(path.clone());
        }
        if let Some(dir) = git_dir {
            let path = Self::repo_config_path(dir);
            if path.exists() {
                config.repo = Some(read_config(&path)?);
                config.repo_path = Some(path);
            }
        }

        config.validate()?;
        tracing::debug!(
            global = ?config.global_path,
            repo = ?config.repo_path,
            "loaded configuration"
        );
        Ok(config)
    }

    /// Parse a global config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let global: GlobalConfig = toml::from_str(text).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        let config = Config {
            global,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Global config paths in search order.
    pub fn global_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var("GITVFS_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("gitvfs/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".gitvfs/config.toml"));
        }
        candidates
    }

    /// Get the canonical path for repo config under a git directory.
    pub fn repo_config_path(git_dir: &Path) -> PathBuf {
        git_dir.join("gitvfs/config.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.global.validate()?;
        if let Some(repo) = &self.repo {
            repo.validate()?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn user_field(&self, pick: impl Fn(&UserConfig) -> Option<&String>) -> Option<&str> {
        let repo = self.repo.as_ref().and_then(|r| r.user.as_ref()).and_then(&pick);
        let global = self.global.user.as_ref().and_then(&pick);
        repo.or(global).map(String::as_str)
    }

    fn merge_field<T>(&self, pick: impl Fn(&MergeConfig) -> Option<T>) -> Option<T> {
        let repo = self.repo.as_ref().and_then(|r| r.merge.as_ref()).and_then(&pick);
        repo.or_else(|| self.global.merge.as_ref().and_then(&pick))
    }

    /// Configured user name, if any.
    pub fn user_name(&self) -> Option<&str> {
        self.user_field(|u| u.name.as_ref())
    }

    /// Configured user email, if any.
    pub fn user_email(&self) -> Option<&str> {
        self.user_field(|u| u.email.as_ref())
    }

    /// Configured identity, when both name and email are set.
    pub fn identity(&self) -> Option<(&str, &str)> {
        Some((self.user_name()?, self.user_email()?))
    }

    /// Default merge strategy. Defaults to recursive.
    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge_field(|m| m.strategy).unwrap_or_default()
    }

    /// Conflict marker width. Defaults to 7.
    pub fn conflict_marker_size(&self) -> usize {
        self.merge_field(|m| m.conflict_marker_size)
            .unwrap_or(Self::DEFAULT_MARKER_SIZE)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

/// Read and parse one config file.
fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_empty_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&[temp.path().join("missing.toml")], None).unwrap();

        assert!(config.identity().is_none());
        assert_eq!(config.merge_strategy(), MergeStrategy::Recursive);
        assert_eq!(config.conflict_marker_size(), 7);
        assert!(config.global_config_loaded_from().is_none());
    }

    #[test]
    fn first_existing_candidate_wins() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a.toml");
        let second = temp.path().join("b.toml");
        fs::write(&second, "[user]\nname = \"Second\"\nemail = \"s@x\"\n").unwrap();

        let config = Config::load_from(&[first, second.clone()], None).unwrap();
        assert_eq!(config.user_name(), Some("Second"));
        assert_eq!(config.global_config_loaded_from(), Some(second.as_path()));
    }

    #[test]
    fn repo_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        fs::write(
            &global,
            r#"
            [user]
            name = "Global"
            email = "global@example.com"

            [merge]
            strategy = "ours"
            "#,
        )
        .unwrap();

        let git_dir = temp.path().join("repo.git");
        fs::create_dir_all(git_dir.join("gitvfs")).unwrap();
        fs::write(
            Config::repo_config_path(&git_dir),
            "[user]\nname = \"Repo\"\n\n[merge]\nconflict_marker_size = 9\n",
        )
        .unwrap();

        let config = Config::load_from(&[global], Some(&git_dir)).unwrap();
        assert_eq!(config.identity(), Some(("Repo", "global@example.com")));
        assert_eq!(config.merge_strategy(), MergeStrategy::Ours);
        assert_eq!(config.conflict_marker_size(), 9);
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "colour = true\n").unwrap();

        let result = Config::load_from(&[path], None);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn invalid_values_rejected() {
        let result = Config::from_toml_str("[merge]\nconflict_marker_size = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
