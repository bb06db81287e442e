//! Structured logging utilities.
//!
//! [`OpTimer`] wraps every lifecycle and control operation so each request
//! leaves one completion line with its duration and outcome. [`init_tracing`]
//! installs the subscriber used by the binary.

use std::time::Instant;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{ControlError, ErrorKind};

/// Operation timer for measuring and logging execution duration.
///
/// ```rust,ignore
/// use shannon_trigger::logging::OpTimer;
///
/// let timer = OpTimer::new("schedule", "online");
/// let result = do_online().await;
/// timer.finish_with_result(&result);
/// ```
#[derive(Debug)]
pub struct OpTimer {
    /// Component being timed (e.g., "schedule", "control").
    component: &'static str,
    /// Operation being performed (e.g., "online", "pause").
    operation: String,
    start: Instant,
}

impl OpTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(component: &'static str, operation: impl Into<String>) -> Self {
        let operation = operation.into();

        tracing::debug!(
            component = component,
            operation = %operation,
            "Operation started"
        );

        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }

    /// Finishes the timer with outcome-aware logging.
    ///
    /// Rejections the caller can act on (validation, conflicts, missing
    /// entities) are logged at `warn`; infrastructure faults at `error`.
    pub fn finish_with_result<T>(self, result: &Result<T, ControlError>) {
        let duration_ms = self.elapsed_ms();

        match result {
            Ok(_) => {
                tracing::info!(
                    component = self.component,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    "Operation completed successfully"
                );
            }
            Err(e) if matches!(e.kind(), ErrorKind::Unavailable | ErrorKind::Internal) => {
                tracing::error!(
                    component = self.component,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    error = %e,
                    "Operation failed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    component = self.component,
                    operation = %self.operation,
                    duration_ms = duration_ms,
                    kind = ?e.kind(),
                    error = %e,
                    "Operation rejected"
                );
            }
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
