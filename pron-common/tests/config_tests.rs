//! Tests for settings resolution and startup validation
//!
//! Tests that touch the process environment are marked #[serial] so they never
//! observe each other's variables.

use pron_common::config::{load_toml_config, LoggingConfig, Settings, TomlConfig, KEY_ENGINE};
use pron_common::Error;
use base64::Engine;
use serial_test::serial;
use std::collections::HashMap;
use std::env;
use std::io::Write;

fn valid_key() -> String {
    KEY_ENGINE.encode([42u8; 32])
}

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults_when_nothing_configured() {
    let settings = Settings::resolve(None, lookup(&[])).unwrap();

    assert!(settings.mock_mode);
    assert_eq!(settings.port, 8000);
    assert_eq!(settings.speech_region, "brazilsouth");
    assert_eq!(settings.blob_container_name, "audio-recordings");
    assert_eq!(settings.max_audio_bytes, 10 * 1024 * 1024);
    assert_eq!(settings.cors_origins.len(), 3);
}

#[test]
fn test_environment_overrides_toml() {
    let toml_config = TomlConfig {
        port: Some(9000),
        speech_region: Some("westeurope".to_string()),
        database_url: Some("sqlite://from-toml.db".to_string()),
        ..TomlConfig::default()
    };

    let settings = Settings::resolve(
        Some(toml_config),
        lookup(&[("PORT", "9100"), ("MOCK_MODE", "false")]),
    )
    .unwrap();

    assert_eq!(settings.port, 9100);
    assert!(!settings.mock_mode);
    // TOML still fills what the environment leaves unset
    assert_eq!(settings.speech_region, "westeurope");
    assert_eq!(settings.database_url, "sqlite://from-toml.db");
}

#[test]
fn test_blank_environment_value_is_ignored() {
    let settings = Settings::resolve(None, lookup(&[("SPEECH_REGION", "  ")])).unwrap();
    assert_eq!(settings.speech_region, "brazilsouth");
}

#[test]
fn test_invalid_boolean_is_config_error() {
    let result = Settings::resolve(None, lookup(&[("MOCK_MODE", "sometimes")]));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_validate_requires_encryption_and_secret_keys() {
    let settings = Settings::resolve(None, lookup(&[])).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("ENCRYPTION_KEY"));

    let key = valid_key();
    let settings = Settings::resolve(None, lookup(&[("ENCRYPTION_KEY", &key)])).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("SECRET_KEY"));

    let settings = Settings::resolve(
        None,
        lookup(&[("ENCRYPTION_KEY", &key), ("SECRET_KEY", "s3cret")]),
    )
    .unwrap();
    assert!(settings.validate().is_ok());
}

#[test]
fn test_validate_live_mode_requires_provider_settings() {
    let key = valid_key();
    let base = [
        ("ENCRYPTION_KEY", key.as_str()),
        ("SECRET_KEY", "s3cret"),
        ("MOCK_MODE", "false"),
    ];

    let settings = Settings::resolve(None, lookup(&base)).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("SPEECH_KEY"));

    let mut with_speech = base.to_vec();
    with_speech.push(("SPEECH_KEY", "abc123"));
    let settings = Settings::resolve(None, lookup(&with_speech)).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("BLOB_CONNECTION_STRING"));

    with_speech.push((
        "BLOB_CONNECTION_STRING",
        "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
    ));
    let settings = Settings::resolve(None, lookup(&with_speech)).unwrap();
    assert!(settings.validate().is_ok());
}

#[test]
fn test_validate_rejects_malformed_encryption_key() {
    let settings = Settings::resolve(
        None,
        lookup(&[("ENCRYPTION_KEY", "too-short"), ("SECRET_KEY", "s3cret")]),
    )
    .unwrap();
    assert!(matches!(settings.validate(), Err(Error::Config(_))));
}

#[test]
fn test_debug_output_redacts_secrets() {
    let key = valid_key();
    let settings = Settings::resolve(
        None,
        lookup(&[("ENCRYPTION_KEY", &key), ("SECRET_KEY", "hunter2")]),
    )
    .unwrap();
    let rendered = format!("{:?}", settings);
    assert!(!rendered.contains(&key));
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let result = load_toml_config(Some(std::path::Path::new("/nonexistent/pronielts.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_toml_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "port = 8123\nmock_mode = true\nblob_container_name = \"clips\"\n\n[logging]\nlevel = \"debug\""
    )
    .unwrap();

    let config = load_toml_config(Some(file.path())).unwrap().unwrap();
    assert_eq!(config.port, Some(8123));
    assert_eq!(config.blob_container_name.as_deref(), Some("clips"));

    let settings = Settings::resolve(Some(config), lookup(&[])).unwrap();
    assert_eq!(settings.log_level, "debug");
    assert_eq!(settings.blob_container_name, "clips");
}

#[test]
fn test_log_level_environment_overrides_toml() {
    let toml_config = TomlConfig {
        logging: LoggingConfig {
            level: Some("debug".to_string()),
        },
        ..TomlConfig::default()
    };

    let settings =
        Settings::resolve(Some(toml_config.clone()), lookup(&[("LOG_LEVEL", "warn")])).unwrap();
    assert_eq!(settings.log_level, "warn");

    let settings = Settings::resolve(Some(toml_config), lookup(&[])).unwrap();
    assert_eq!(settings.log_level, "debug");

    let settings = Settings::resolve(None, lookup(&[])).unwrap();
    assert_eq!(settings.log_level, "info");
}

#[test]
#[serial]
fn test_load_reads_process_environment() {
    env::set_var("PORT", "8765");
    env::set_var("BLOB_CONTAINER_NAME", "env-container");

    let file = tempfile::NamedTempFile::new().unwrap();
    let settings = Settings::load(Some(file.path())).unwrap();

    assert_eq!(settings.port, 8765);
    assert_eq!(settings.blob_container_name, "env-container");

    env::remove_var("PORT");
    env::remove_var("BLOB_CONTAINER_NAME");
}
