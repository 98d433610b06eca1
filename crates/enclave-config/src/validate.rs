//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for any channel or bus capacity.
const MAX_CAPACITY: usize = 1 << 20;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_executor(config)?;
    validate_multichain(config)?;
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        });
    }

    if !matches!(
        l.format.to_lowercase().as_str(),
        "pretty" | "compact" | "json" | "full"
    ) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        });
    }

    Ok(())
}

fn validate_executor(config: &Config) -> ConfigResult<()> {
    let e = &config.executor;

    for (field, value) in [
        ("executor.channel_capacity", e.channel_capacity),
        ("executor.event_capacity", e.event_capacity),
    ] {
        if value == 0 || value > MAX_CAPACITY {
            return Err(ConfigError::ValidationError {
                field: field.to_owned(),
                message: format!("must be between 1 and {MAX_CAPACITY}"),
            });
        }
    }

    if e.runtime_command.first().is_some_and(|p| p.trim().is_empty()) {
        return Err(ConfigError::ValidationError {
            field: "executor.runtime_command".to_owned(),
            message: "program must not be blank".to_owned(),
        });
    }

    Ok(())
}

fn validate_multichain(config: &Config) -> ConfigResult<()> {
    if config.multichain.approval_type.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "multichain.approval_type".to_owned(),
            message: "must not be empty".to_owned(),
        });
    }
    Ok(())
}
