//! Configuration handling for archive-bridge
//!
//! Configuration is read from the `--config` path, else `archive-bridge.toml`
//! in the working directory, else `config.toml` in the platform config
//! directory (e.g. `~/.config/archive-bridge/`). Missing files mean defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    MigrationConfig, ReferenceKind, TieBreak, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PASSES,
};

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "archive-bridge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Settings for the reference linearizer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinearizeSettings {
    /// Kinds to linearize; empty means every kind present
    pub kinds: Vec<ReferenceKind>,

    /// Reversal search depth
    pub max_depth: usize,

    /// Feasibility pass cap
    pub max_passes: usize,
}

impl Default for LinearizeSettings {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

/// Settings for markup reconstruction
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MarkupSettings {
    pub tie_break: TieBreak,
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub linearize: LinearizeSettings,
    pub markup: MarkupSettings,

    /// File the configuration was loaded from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Loads configuration, preferring an explicit path
    ///
    /// An explicit path must exist; the fallback locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Self::from_file(&local);
        }

        if let Some(global) = Self::global_config_dir().map(|dir| dir.join("config.toml")) {
            if global.is_file() {
                return Self::from_file(&global);
            }
        }

        Ok(Self::default())
    }

    /// Returns the platform config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "archive-bridge", "archive-bridge")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to load config: {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parses and validates TOML configuration
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks limits; run again after command-line overrides
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.linearize.max_passes == 0 {
            return Err(ConfigError::Invalid(
                "linearize.max_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for a migration run
    pub fn migration(&self) -> MigrationConfig {
        MigrationConfig {
            kinds: self.linearize.kinds.clone(),
            max_depth: self.linearize.max_depth,
            max_passes: self.linearize.max_passes,
            tie_break: self.markup.tie_break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();

        assert!(config.linearize.kinds.is_empty());
        assert_eq!(config.linearize.max_depth, 3);
        assert_eq!(config.linearize.max_passes, 10_000);
        assert_eq!(config.markup.tie_break, TieBreak::Nesting);
        assert!(config.source.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[linearize]
kinds = ["hasLinkTo", "partOf"]
max_depth = 4
max_passes = 500

[markup]
tie_break = "supplied"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(
            config.linearize.kinds,
            vec![
                ReferenceKind::new("hasLinkTo").unwrap(),
                ReferenceKind::new("partOf").unwrap()
            ]
        );
        assert_eq!(config.linearize.max_depth, 4);
        assert_eq!(config.linearize.max_passes, 500);
        assert_eq!(config.markup.tie_break, TieBreak::Supplied);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = Config::parse("[linearize]\nmax_depth = 5\n").unwrap();
        assert_eq!(config.linearize.max_depth, 5);
        assert_eq!(config.linearize.max_passes, 10_000);
        assert_eq!(config.markup.tie_break, TieBreak::Nesting);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::parse("[markup]\ntie_break = \"random\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::parse("[linearize]\nmax_passes = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn overridden_values_are_revalidated() {
        let mut config = Config::default();
        config.linearize.max_depth = usize::MAX;
        assert!(config.validate().is_ok());

        config.linearize.max_passes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[linearize]\nkinds = [\"hasLinkTo\"]\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.linearize.kinds.len(), 1);
        assert_eq!(config.source.as_deref(), Some(path.as_path()));

        let migration = config.migration();
        assert_eq!(migration.kinds, config.linearize.kinds);
        assert_eq!(migration.max_depth, 3);
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
