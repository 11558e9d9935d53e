//! Tracing subscriber initialisation.
//!
//! Services call [`init_tracing`] once at startup. JSON output is meant for
//! log collectors in production; the plain formatter is for local runs.

use crate::config::ObservabilityConfig;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Errors raised while installing the global subscriber.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The configured filter directive could not be parsed.
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    /// A global subscriber was already installed.
    #[error("Tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Build the `EnvFilter` for a configuration.
///
/// `RUST_LOG` takes precedence when set; otherwise `log_level` is used.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if `log_level` is not a valid directive.
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::InvalidFilter {
        directive: config.log_level.clone(),
        reason: e.to_string(),
    })
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// - `TelemetryError::InvalidFilter` - the level directive does not parse
/// - `TelemetryError::AlreadyInitialized` - called more than once per process
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_rejects_garbage_directive() {
        if std::env::var("RUST_LOG").is_ok() {
            // RUST_LOG overrides the configured level
            return;
        }
        let config = ObservabilityConfig {
            log_level: "service_auth=notalevel".to_string(),
            json_logs: false,
        };

        let result = build_filter(&config);
        assert!(matches!(result, Err(TelemetryError::InvalidFilter { .. })));
    }

    #[test]
    fn test_init_tracing_only_once() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            json_logs: true,
        };

        assert!(init_tracing(&config).is_ok());
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
