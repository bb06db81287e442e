//! Configuration management for the trigger service.
//!
//! Configuration is loaded from (in order of precedence, lowest first):
//! 1. Built-in defaults
//! 2. Config files (`config/shannon-trigger.{yaml,toml,json}`)
//! 3. Environment variables prefixed with `SHANNON_TRIGGER__`
//!
//! # Validation
//!
//! Use [`ConfigValidator`] to reject bad values before wiring components:
//!
//! ```rust,ignore
//! use shannon_trigger::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load_unchecked()?;
//! ConfigValidator::validate(&config)?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};

use crate::domain::Priority;

/// Worker group used when a request or schedule does not name one.
pub const DEFAULT_WORKER_GROUP: &str = "default";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Trigger and control settings.
    #[serde(default)]
    pub control: ControlConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config files.
    ///
    /// After loading, the configuration is validated. Use [`Self::load_unchecked`]
    /// to skip validation.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;

        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        Self::load_with_file("config/shannon-trigger")
    }

    /// Load configuration using `path` (without extension) as the optional
    /// config file, then environment overrides.
    pub fn load_with_file(path: &str) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("control.preview_count", 5)?
            .set_default("control.command_history_limit", 10)?
            .set_default("control.default_worker_group", DEFAULT_WORKER_GROUP)?
            .set_default("control.default_timezone", "UTC")?
            .set_default("logging.level", "info")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SHANNON_TRIGGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Trigger and control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Number of fire times returned by a schedule preview.
    #[serde(default = "default_preview_count")]
    pub preview_count: usize,
    /// Command types remembered on a workflow instance.
    #[serde(default = "default_command_history_limit")]
    pub command_history_limit: usize,
    /// Worker group for commands and schedules that do not name one.
    #[serde(default = "default_worker_group")]
    pub default_worker_group: String,
    /// Priority for commands that do not set one.
    #[serde(default)]
    pub default_priority: Priority,
    /// Timezone whose calendar days backfill falls back to.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            preview_count: default_preview_count(),
            command_history_limit: default_command_history_limit(),
            default_worker_group: default_worker_group(),
            default_priority: Priority::default(),
            default_timezone: default_timezone(),
        }
    }
}

fn default_preview_count() -> usize {
    5
}

fn default_command_history_limit() -> usize {
    10
}

fn default_worker_group() -> String {
    DEFAULT_WORKER_GROUP.to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to use JSON format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.control.preview_count, 5);
        assert_eq!(config.control.command_history_limit, 10);
        assert_eq!(config.control.default_worker_group, "default");
        assert_eq!(config.control.default_priority, Priority::Medium);
        assert_eq!(config.control.default_timezone, "UTC");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_file_and_env_overrides() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("Failed to create temp file");
        writeln!(
            file,
            "[control]\npreview_count = 8\ndefault_timezone = \"Asia/Shanghai\""
        )
        .unwrap();
        let path = file.path().with_extension("");

        // SAFETY: These are test environment variables and we're in a controlled test environment
        unsafe {
            std::env::set_var("SHANNON_TRIGGER__CONTROL__DEFAULT_WORKER_GROUP", "gpu");
        }

        let config = AppConfig::load_with_file(path.to_str().unwrap()).unwrap();

        // SAFETY: These are test environment variables and we're in a controlled test environment
        unsafe {
            std::env::remove_var("SHANNON_TRIGGER__CONTROL__DEFAULT_WORKER_GROUP");
        }

        assert_eq!(config.control.preview_count, 8);
        assert_eq!(config.control.default_timezone, "Asia/Shanghai");
        assert_eq!(config.control.default_worker_group, "gpu");
        assert_eq!(config.control.command_history_limit, 10);
    }
}
