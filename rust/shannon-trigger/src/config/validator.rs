//! Configuration validation for the trigger service.
//!
//! Every section is checked and all problems are reported together, so an
//! operator can fix a bad deployment in one pass.

use super::AppConfig;
use super::error::{ConfigResult, ConfigurationError};
use super::{ControlConfig, LoggingConfig};
use crate::scheduler::CronParser;

/// Upper bound for `control.preview_count`.
pub const MAX_PREVIEW_COUNT: usize = 100;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator.
///
/// | Setting | Rule |
/// |---------|------|
/// | `control.preview_count` | 1..=100 |
/// | `control.command_history_limit` | at least 1 |
/// | `control.default_worker_group` | non-empty |
/// | `control.default_timezone` | IANA timezone id |
/// | `logging.level` | trace, debug, info, warn, error (or an env-filter directive) |
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    ///
    /// Returns `Ok(())` if valid, or a `ConfigurationError` with all issues.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        for result in [
            Self::validate_control(&config.control),
            Self::validate_logging(&config.logging),
        ] {
            match result {
                Ok(()) => {}
                Err(ConfigurationError::Multiple(errs)) => errors.extend(errs),
                Err(e) => errors.push(e),
            }
        }

        ConfigurationError::from_list(errors)
    }

    /// Validate the control section.
    pub fn validate_control(control: &ControlConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if control.preview_count == 0 || control.preview_count > MAX_PREVIEW_COUNT {
            errors.push(ConfigurationError::invalid(
                format!(
                    "control.preview_count is {}, expected 1..={MAX_PREVIEW_COUNT}",
                    control.preview_count
                ),
                "Set SHANNON_TRIGGER__CONTROL__PREVIEW_COUNT to a value between 1 and 100",
            ));
        }

        if control.command_history_limit == 0 {
            errors.push(ConfigurationError::invalid(
                "control.command_history_limit must be at least 1",
                "Set SHANNON_TRIGGER__CONTROL__COMMAND_HISTORY_LIMIT to a positive number",
            ));
        }

        if control.default_worker_group.trim().is_empty() {
            errors.push(ConfigurationError::missing_required(
                "control.default_worker_group",
                "SHANNON_TRIGGER__CONTROL__DEFAULT_WORKER_GROUP",
            ));
        }

        if CronParser::parse_timezone(&control.default_timezone).is_err() {
            errors.push(ConfigurationError::invalid(
                format!(
                    "control.default_timezone '{}' is not a known timezone",
                    control.default_timezone
                ),
                "Use an IANA timezone id such as UTC or Asia/Shanghai",
            ));
        }

        ConfigurationError::from_list(errors)
    }

    /// Validate the logging section.
    pub fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
        let level = logging.level.trim().to_ascii_lowercase();
        // Directives such as "shannon_trigger=debug" are passed to the env filter as is.
        if LOG_LEVELS.contains(&level.as_str()) || level.contains('=') {
            return Ok(());
        }
        Err(ConfigurationError::invalid(
            format!("logging.level '{}' is not a log level", logging.level),
            "Set SHANNON_TRIGGER__LOGGING__LEVEL to one of: trace, debug, info, warn, error",
        ))
    }
}
