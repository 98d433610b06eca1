//! Layered loading against real files.

use std::collections::HashMap;
use std::io::Write;

use enclave_config::{Config, ConfigError, loader};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn missing_user_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
    assert_eq!(config.logging.format, "compact");
    assert_eq!(config.executor.event_capacity, 1024);
}

#[test]
fn user_file_overrides_defaults() {
    let file = write_config(
        r#"
        [executor]
        channel_capacity = 16
        runtime_command = ["node", "runner.js"]

        [multichain]
        notify_on_close = false
        "#,
    );
    let config = loader::load_layers(Some(file.path()), &HashMap::new()).unwrap();
    assert_eq!(config.executor.channel_capacity, 16);
    assert_eq!(config.executor.runtime_command, vec!["node", "runner.js"]);
    assert!(!config.multichain.notify_on_close);
    assert_eq!(config.executor.event_capacity, 1024);
}

#[test]
fn env_fills_only_unset_fields() {
    let file = write_config("[logging]\nlevel = \"warn\"\n");
    let env: HashMap<String, String> = [
        ("ENCLAVE_LOG_LEVEL".to_owned(), "trace".to_owned()),
        ("ENCLAVE_LOG_FORMAT".to_owned(), "json".to_owned()),
    ]
    .into_iter()
    .collect();

    let config = loader::load_layers(Some(file.path()), &env).unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[executor\nchannel_capacity = ");
    let err = loader::load_layers(Some(file.path()), &HashMap::new()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn invalid_values_fail_validation() {
    let file = write_config("[executor]\nevent_capacity = 0\n");
    let err = loader::load_layers(Some(file.path()), &HashMap::new()).unwrap_err();
    assert!(
        matches!(err, ConfigError::ValidationError { ref field, .. } if field == "executor.event_capacity")
    );
}
