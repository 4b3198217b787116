//! Engine configuration loaded from TOML.
//!
//! The built-in defaults are embedded from `config/default.toml`. A user
//! file only needs the values it wants to change; everything else falls
//! back to the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clean592_report_models::ScoringPolicy;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parsed but cannot be used.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Settings for the report queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Point awards and rank curve.
    pub scoring: ScoringPolicy,
    /// Submission retry limits.
    pub retry: RetryPolicy,
    /// Delay of [`crate::SimulatedClient`], in milliseconds.
    pub simulated_delay_ms: u64,
    /// Where the file store keeps its data. `None` means the storage
    /// crate's default location.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringPolicy::default(),
            retry: RetryPolicy::default(),
            simulated_delay_ms: 2000,
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document, filling missing values with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is not valid TOML or the
    /// resulting values fail [`EngineConfig::validate`].
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unusable scoring policy, a
    /// retry policy that allows no attempts, or one that parks every
    /// report before its first sync.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate().map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.retry.max_report_retries == 0 {
            return Err(ConfigError::Invalid {
                message: "retry.max_report_retries must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Delay of the simulated submission endpoint.
    #[must_use]
    pub const fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }
}

/// Returns the configuration embedded in the binary.
///
/// # Panics
///
/// Panics if the embedded TOML is malformed (this is a compile-time
/// guarantee since the file is embedded and covered by tests).
#[must_use]
pub fn builtin_config() -> EngineConfig {
    EngineConfig::from_toml(DEFAULT_CONFIG)
        .unwrap_or_else(|e| panic!("Failed to parse embedded default config: {e}"))
}

/// Loads configuration from `path`, or the built-in defaults when `path`
/// is `None`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(builtin_config());
    };

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = EngineConfig::from_toml(&contents)?;
    log::info!("Loaded engine config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_matches_defaults() {
        assert_eq!(builtin_config(), EngineConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            "simulated_delay_ms = 0\n[scoring]\nreceived_points = 25\n",
        )
        .unwrap();

        assert_eq!(config.simulated_delay_ms, 0);
        assert_eq!(config.scoring.received_points, 25);
        assert_eq!(config.scoring.points_per_rank, 30);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn zero_points_per_rank_is_rejected() {
        let result = EngineConfig::from_toml("[scoring]\npoints_per_rank = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = EngineConfig::from_toml("[retry]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_report_retries_is_rejected() {
        let result = EngineConfig::from_toml("[retry]\nmax_report_retries = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = EngineConfig::from_toml("scoring = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_config(Some(Path::new("/nonexistent/clean592.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
