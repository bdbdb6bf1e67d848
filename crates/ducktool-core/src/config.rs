//! Configuration handling for duck

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "duck.toml";

/// Error loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Duck configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DuckConfig {
    /// Refactoring defaults
    #[serde(default)]
    pub refactoring: RefactoringConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults used by the refactoring model builders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefactoringConfig {
    /// Parameter name of generated `Property Let`/`Set` accessors
    #[serde(default = "default_parameter_name")]
    pub parameter_name: String,

    /// Prefix of extracted interface names
    #[serde(default = "default_interface_prefix")]
    pub interface_prefix: String,

    /// Body of generated interface member stubs
    #[serde(default = "default_stub_body")]
    pub stub_body: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter when neither `RUST_LOG` nor `--log-level` is given
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_parameter_name() -> String {
    "value".to_string()
}

fn default_interface_prefix() -> String {
    "I".to_string()
}

fn default_stub_body() -> String {
    "Err.Raise 5 ' TODO implement interface member".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RefactoringConfig {
    fn default() -> Self {
        Self {
            parameter_name: default_parameter_name(),
            interface_prefix: default_interface_prefix(),
            stub_body: default_stub_body(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DuckConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from `duck.toml` in the given project directory
    pub fn load_from_project(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(DuckConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = DuckConfig::default();
        assert_eq!(config.refactoring.parameter_name, "value");
        assert_eq!(config.refactoring.interface_prefix, "I");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DuckConfig::load_from_project(dir.path()).unwrap();
        assert_eq!(config, DuckConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[refactoring]\nparameter_name = \"rhs\"\n",
        )
        .unwrap();
        let config = DuckConfig::load_from_project(dir.path()).unwrap();
        assert_eq!(config.refactoring.parameter_name, "rhs");
        assert_eq!(config.refactoring.interface_prefix, "I");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[refactoring\n").unwrap();
        let err = DuckConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = DuckConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
