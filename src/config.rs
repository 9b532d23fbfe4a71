//! Runtime configuration loaded from TOML.
//!
//! ```toml
//! # kifu-tree.toml
//! preview_debounce_ms = 30
//! autosave = true
//! default_format = "kif"
//! log_filter = "info"
//! ```
//!
//! Every field is optional; missing ones take their default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::KifuFormat;

/// File looked up in the working directory when no path is given
pub const CONFIG_FILE: &str = "kifu-tree.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Delay before a preview frame is rendered
    pub preview_debounce_ms: u64,
    /// Save after every successful edit when a target is set
    pub autosave: bool,
    /// Format used when a file name does not imply one
    pub default_format: KifuFormat,
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preview_debounce_ms: 30,
            autosave: true,
            default_format: KifuFormat::Kif,
            log_filter: "info".to_string(),
        }
    }
}

/// Errors that can occur when loading a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `explicit` if given, else `kifu-tree.toml` when it exists, else
    /// the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_toml_file(path),
            None if Path::new(CONFIG_FILE).exists() => Self::from_toml_file(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn preview_debounce(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str("autosave = false\ndefault_format = \"json\"").unwrap();
        assert!(!config.autosave);
        assert_eq!(config.default_format, KifuFormat::Json);
        assert_eq!(config.preview_debounce(), Duration::from_millis(30));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("default_format = \"csa\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "preview_debounce_ms = 5\nlog_filter = \"debug\"").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.preview_debounce_ms, 5);
        assert_eq!(config.log_filter, "debug");

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
    }
}
