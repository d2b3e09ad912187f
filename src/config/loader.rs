//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery,
//! environment detection and layering of environment-variable overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::TaskRelayConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "taskrelay";
const ENV_PREFIX: &str = "TASKRELAY";

/// Loaded configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: TaskRelayConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process environment.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build_layered(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            relay_bind = %config.relay.bind_address,
            task_queue = %config.worker.resolved_task_queue(),
            max_queue_depth = config.relay.max_queue_depth,
            idle_timeout_seconds = config.relay.idle_timeout_seconds,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedders)
    pub fn from_config(config: TaskRelayConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &TaskRelayConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("TASKRELAY_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn build_layered(config_directory: &Path, environment: &str) -> ConfigResult<TaskRelayConfig> {
        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let settings = config::Config::builder()
            .add_source(config::File::from(base).required(false))
            .add_source(config::File::from(overlay).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("workflow.retry.non_retryable_error_types")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_failed(config_directory.display().to_string(), e))?;

        settings
            .try_deserialize::<TaskRelayConfig>()
            .map_err(|e| ConfigurationError::load_failed("merged configuration", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().join("absent")), "test")
                .unwrap();
        assert_eq!(manager.config().relay.max_queue_depth, 1000);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_overlay_wins_over_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("taskrelay.toml"),
            "[relay]\nmax_queue_depth = 50\nidle_timeout_seconds = 120\n\n[worker]\ntenant_id = \"acme\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("taskrelay.test.toml"),
            "[relay]\nidle_timeout_seconds = 15\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();
        assert_eq!(config.relay.max_queue_depth, 50);
        assert_eq!(config.relay.idle_timeout_seconds, 15);
        assert_eq!(config.worker.resolved_task_queue(), "acme.agent-tasks");
        // untouched sections keep their defaults
        assert_eq!(config.workflow.retry.maximum_attempts, 3);
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("taskrelay.toml"),
            "[workflow]\nmax_execution_seconds = 30\nheartbeat_timeout_seconds = 60\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }
}
