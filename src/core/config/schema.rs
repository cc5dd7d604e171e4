//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$GITVFS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitvfs/config.toml`
//! 3. `~/.gitvfs/config.toml`
//!
//! # Repo Config
//!
//! Located at `<git dir>/gitvfs/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing: identities must be non-empty
//! and conflict markers must have a sane width.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::MergeStrategy;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// [user]
/// name = "Jane Doe"
/// email = "jane@example.com"
///
/// [merge]
/// strategy = "recursive"
/// conflict_marker_size = 7
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Identity used when a commit names no committer
    pub user: Option<UserConfig>,

    /// Merge defaults
    pub merge: Option<MergeConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(user) = &self.user {
            user.validate()?;
        }
        if let Some(merge) = &self.merge {
            merge.validate()?;
        }
        Ok(())
    }
}

/// Repository configuration. Same shape as the global file; values here
/// win over global ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    pub user: Option<UserConfig>,
    pub merge: Option<MergeConfig>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(user) = &self.user {
            user.validate()?;
        }
        if let Some(merge) = &self.merge {
            merge.validate()?;
        }
        Ok(())
    }
}

/// A configured identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UserConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("user.name", &self.name), ("user.email", &self.email)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConfigError::InvalidValue(format!("{field} cannot be empty")));
            }
        }
        Ok(())
    }
}

/// Merge defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Strategy used when a merge does not pick one
    pub strategy: Option<MergeStrategy>,

    /// Width of the `<<<<<<<`, `=======` and `>>>>>>>` markers
    pub conflict_marker_size: Option<usize>,
}

impl MergeConfig {
    /// Accepted marker widths.
    pub const MARKER_SIZES: std::ops::RangeInclusive<usize> = 1..=64;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = self.conflict_marker_size {
            if !Self::MARKER_SIZES.contains(&size) {
                return Err(ConfigError::InvalidValue(format!(
                    "merge.conflict_marker_size must be between {} and {}, got {size}",
                    Self::MARKER_SIZES.start(),
                    Self::MARKER_SIZES.end()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod global_config {
        use super::*;

        #[test]
        fn defaults() {
            let config = GlobalConfig::default();
            assert!(config.user.is_none());
            assert!(config.merge.is_none());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn empty_identity_rejected() {
            let config = GlobalConfig {
                user: Some(UserConfig {
                    name: Some("  ".to_string()),
                    email: Some("a@b.c".to_string()),
                }),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn roundtrip() {
            let config = GlobalConfig {
                user: Some(UserConfig {
                    name: Some("Jane".to_string()),
                    email: Some("jane@example.com".to_string()),
                }),
                merge: Some(MergeConfig {
                    strategy: Some(MergeStrategy::Theirs),
                    conflict_marker_size: Some(9),
                }),
            };

            let toml = toml::to_string_pretty(&config).unwrap();
            let parsed: GlobalConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config, parsed);
        }
    }

    mod merge_config {
        use super::*;

        #[test]
        fn marker_size_bounds() {
            let mut config = MergeConfig {
                conflict_marker_size: Some(0),
                ..Default::default()
            };
            assert!(config.validate().is_err());
            config.conflict_marker_size = Some(65);
            assert!(config.validate().is_err());
            config.conflict_marker_size = Some(7);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn strategy_names() {
            let parsed: MergeConfig = toml::from_str("strategy = \"ours\"").unwrap();
            assert_eq!(parsed.strategy, Some(MergeStrategy::Ours));
            assert!(toml::from_str::<MergeConfig>("strategy = \"octopus\"").is_err());
        }
    }

    mod repo_config {
        use super::*;

        #[test]
        fn reject_unknown_fields() {
            let toml = r#"
                [user]
                name = "x"
                nickname = "y"
            "#;

            let result: Result<RepoConfig, _> = toml::from_str(toml);
            assert!(result.is_err());
        }
    }
}
