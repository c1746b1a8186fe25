//! Service configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STATEHOOK_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default status of entities created without a workflow schema.
pub const DEFAULT_STATUS: &str = "CREATED";

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Schema preloading.
    pub schemas: SchemasConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("STATEHOOK_CONFIG").map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Like [`Config::load`], with the config file given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.engine.apply_env_overrides();
        self.logging.apply_env_overrides();
        self.schemas.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.default_status.is_empty() {
            return Err(ConfigError::Validation(
                "engine.default_status must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache compiled schema definitions between transitions.
    pub cache_definitions: bool,
    /// Initial status of entities without a workflow schema.
    pub default_status: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_definitions: true,
            default_status: DEFAULT_STATUS.to_string(),
        }
    }
}

impl EngineConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(cache) = std::env::var("STATEHOOK_CACHE_DEFINITIONS") {
            self.cache_definitions = parse_bool(&cache);
        }

        if let Ok(status) = std::env::var("STATEHOOK_DEFAULT_STATUS") {
            if !status.is_empty() {
                self.default_status = status;
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(filter) = std::env::var("STATEHOOK_LOG") {
            self.filter = filter;
        }
    }
}

/// Schema preloading configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemasConfig {
    /// Directory of `.json`/`.yaml` schema files loaded at startup.
    pub dir: Option<PathBuf>,
}

impl SchemasConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("STATEHOOK_SCHEMA_DIR") {
            self.dir = Some(PathBuf::from(dir));
        }
    }
}

fn parse_bool(s: &str) -> bool {
    s == "1" || s.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.engine.cache_definitions);
        assert_eq!(config.engine.default_status, "CREATED");
        assert_eq!(config.logging.filter, "info");
        assert!(config.schemas.dir.is_none());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.engine.cache_definitions = false;
        config.schemas.dir = Some(PathBuf::from("/etc/statehook/schemas"));

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(!parsed.engine.cache_definitions);
        assert_eq!(parsed.schemas.dir, config.schemas.dir);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statehook.yaml");
        std::fs::write(&path, "engine:\n  default_status: DRAFT\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.engine.default_status, "DRAFT");
        assert!(config.engine.cache_definitions);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.yaml");

        let mut config = Config::default();
        config.logging.filter = "statehook=debug".to_string();
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.logging.filter, "statehook=debug");
    }

    #[test]
    fn test_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Config::from_file(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io(..))));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "engine: [not, a, map]\n").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(ConfigError::Parse(..))));

        let empty_status = dir.path().join("empty.yaml");
        std::fs::write(&empty_status, "engine:\n  default_status: ''\n").unwrap();
        assert!(matches!(
            Config::from_file(&empty_status),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("yes"));
    }
}
