//! Configuration validation.

use parley_router::{DrainConfig, RouterConfig};

use super::error::{ConfigError, ConfigResult};
use super::schema::{LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_router_config(&config.router)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_router_config(router: &RouterConfig) -> ConfigResult<()> {
    if router.workers == 0 {
        return Err(ConfigError::validation("router.workers must be greater than 0"));
    }

    if router.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "router.queue_capacity must be greater than 0",
        ));
    }

    validate_drain_config(&router.drain)
}

fn validate_drain_config(drain: &DrainConfig) -> ConfigResult<()> {
    if drain.initial_backoff_ms == 0 {
        return Err(ConfigError::validation(
            "router.drain.initial_backoff_ms must be greater than 0",
        ));
    }

    if drain.max_backoff_ms < drain.initial_backoff_ms {
        return Err(ConfigError::validation(
            "router.drain.max_backoff_ms must be greater than or equal to initial_backoff_ms",
        ));
    }

    if !drain.multiplier.is_finite() || drain.multiplier < 1.0 {
        return Err(ConfigError::validation(
            "router.drain.multiplier must be a finite number of at least 1.0",
        ));
    }

    if drain.deadline_ms == 0 {
        return Err(ConfigError::validation(
            "router.drain.deadline_ms must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if let Some(target) = logging.filters.keys().find(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "logging.filters contains an empty target: {target:?}"
        )));
    }
    Ok(())
}
