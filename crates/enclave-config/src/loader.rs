//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge the user file (`~/.enclave/config.toml` or an explicit path)
//! 3. Apply `ENCLAVE_*` env var fallbacks for fields no file set
//! 4. Deserialize the merged tree → `Config`
//! 5. Validate

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Environment variables and the field each one fills.
const ENV_MAPPINGS: &[(&str, &str)] = &[
    ("ENCLAVE_LOG_LEVEL", "logging.level"),
    ("ENCLAVE_LOG_FORMAT", "logging.format"),
    ("ENCLAVE_EXECUTOR_CHANNEL_CAPACITY", "executor.channel_capacity"),
    ("ENCLAVE_EXECUTOR_EVENT_CAPACITY", "executor.event_capacity"),
    ("ENCLAVE_MULTICHAIN_APPROVAL_TYPE", "multichain.approval_type"),
];

/// Load configuration with layered precedence.
///
/// `user_file` replaces the `~/.enclave/config.toml` lookup when given.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the user file is malformed, or if the final
/// merged configuration fails validation.
pub fn load(user_file: Option<&Path>) -> ConfigResult<Config> {
    let path = match user_file {
        Some(p) => p.to_path_buf(),
        None => home_directory()?.join(".enclave").join("config.toml"),
    };
    let env_vars: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("ENCLAVE_"))
        .collect();
    load_layers(Some(&path), &env_vars)
}

/// Load configuration from an optional user file and an explicit set of
/// environment variables.
///
/// # Errors
///
/// See [`load`].
pub fn load_layers<S: ::std::hash::BuildHasher>(
    user_file: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut set_by_file = HashSet::new();
    if let Some(path) = user_file
        && let Some(overlay) = try_load_file(path)?
    {
        collect_leaves(&overlay, "", &mut set_by_file);
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded user config");
    }

    let mut env_count: usize = 0;
    for (var_name, field_path) in ENV_MAPPINGS {
        if set_by_file.contains(*field_path) {
            continue;
        }
        if let Some(val) = env_vars.get(*var_name) {
            debug!(var = var_name, field = field_path, "applying env var fallback");
            set_field_from_string(&mut merged, field_path, val);
            env_count = env_count.saturating_add(1);
        }
    }
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Recursively deep-merge `overlay` into `base`.
///
/// Tables merge per field; scalars and arrays from the overlay replace.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

fn collect_leaves(val: &toml::Value, prefix: &str, out: &mut HashSet<String>) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            collect_leaves(child, &path, out);
        }
    } else {
        out.insert(prefix.to_owned());
    }
}

/// Set a dotted field from an env string, typed after the value it replaces.
fn set_field_from_string(root: &mut toml::Value, field_path: &str, raw: &str) {
    let mut node = root;
    let mut parts = field_path.split('.').peekable();
    while let Some(part) = parts.next() {
        let toml::Value::Table(table) = node else {
            return;
        };
        if parts.peek().is_none() {
            let value = match table.get(part) {
                Some(toml::Value::Integer(_)) => raw
                    .parse::<i64>()
                    .map_or_else(|_| toml::Value::String(raw.to_owned()), toml::Value::Integer),
                Some(toml::Value::Boolean(_)) => raw
                    .parse::<bool>()
                    .map_or_else(|_| toml::Value::String(raw.to_owned()), toml::Value::Boolean),
                _ => toml::Value::String(raw.to_owned()),
            };
            table.insert(part.to_owned(), value);
            return;
        }
        node = table
            .entry(part.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.executor.channel_capacity, 64);
        assert_eq!(config.multichain.approval_type, "multichain_connect");
        assert!(config.multichain.notify_on_close);
    }

    #[test]
    fn test_try_load_file_missing() {
        let result = try_load_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_env_typed_after_existing_value() {
        let mut val: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        set_field_from_string(&mut val, "executor.channel_capacity", "8");
        set_field_from_string(&mut val, "logging.level", "debug");
        let config: Config = val.try_into().unwrap();
        assert_eq!(config.executor.channel_capacity, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_deep_merge_replaces_leaves_only() {
        let mut base: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        let overlay: toml::Value = toml::from_str("[logging]\nformat = \"json\"").unwrap();
        deep_merge(&mut base, &overlay);
        let config: Config = base.try_into().unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }
}
