//! Engine Configuration
//!
//! Tunables for the workflow engine, loaded from YAML.
//!
//! # Config File Resolution
//!
//! When no path is given explicitly the config file is resolved in the
//! following order:
//! 1. The `FLOWRUNNER_CONFIG` environment variable
//! 2. `flowrunner.yaml` in the current directory
//!
//! A missing default file is not an error; the defaults apply.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Maximum number of node executions in one run.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "FLOWRUNNER_CONFIG";

/// Lazily-resolved path of the default config file.
pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            info!("Using config from {}: {}", CONFIG_ENV_VAR, path);
            return PathBuf::from(path);
        }
    }
    PathBuf::from("flowrunner.yaml")
});

/// Workflow engine settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on node executions per run
    pub max_iterations: usize,

    /// Resolve capability references when a graph is registered instead of
    /// at its first run
    pub resolve_on_create: bool,

    /// Keep at most this many runs, evicting the oldest completed ones.
    /// `None` keeps every run for the life of the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retained_runs: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            resolve_on_create: false,
            max_retained_runs: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a YAML config.
    pub fn from_yaml_str(content: &str) -> Result<Self, EngineError> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads the config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;

        let config = Self::from_yaml_str(&content)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Loads the config from [`CONFIG_PATH`], or defaults if it does not exist.
    pub fn load_default() -> Result<Self, EngineError> {
        if CONFIG_PATH.exists() {
            Self::load(&*CONFIG_PATH)
        } else {
            debug!("No config at {}, using defaults", CONFIG_PATH.display());
            Ok(Self::default())
        }
    }

    /// Rejects settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_iterations == 0 {
            return Err(EngineError::Config("max_iterations must be at least 1".into()));
        }
        if self.max_retained_runs == Some(0) {
            return Err(EngineError::Config("max_retained_runs must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 1000);
        assert!(!config.resolve_on_create);
        assert!(config.max_retained_runs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("max_retained_runs: 50\n").unwrap();
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.max_retained_runs, Some(50));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("  \n").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = EngineConfig::from_yaml_str("max_iterations: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_rejects_zero_retention() {
        assert!(EngineConfig::from_yaml_str("max_retained_runs: 0\n").is_err());
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        let err = EngineConfig::from_yaml_str("max_iterations: lots\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("flowrunner.yaml");
        fs::write(&path, "max_iterations: 25\nresolve_on_create: true\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_iterations, 25);
        assert!(config.resolve_on_create);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/flowrunner.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
