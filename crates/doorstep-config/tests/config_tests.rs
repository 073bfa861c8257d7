// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Doorstep configuration system.

use doorstep_config::diagnostic::ConfigError;
use doorstep_config::model::{CacheBackend, DoorstepConfig};
use doorstep_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

/// Valid TOML with all sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_doorstep_config() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 8080
public_base_url = "https://hooks.example.com"
bearer_token = "control-token"

[storage]
database_path = "/tmp/doorstep.db"
wal_mode = false

[queue]
lease_secs = 60
recording_workers = 4

[telephony]
account_sid = "AC123"
auth_token = "secret"
caller_number = "+15550001111"

[media]
endpoint = "https://s3.us-east-1.amazonaws.com"
bucket = "recordings"
access_key_id = "AKIA"
secret_access_key = "shh"

[speech]
api_key = "sk-test"
language = "es"

[cache]
backend = "memory"

[push]
vapid_public_key = "BPub"
vapid_private_key = "priv"

[pipeline]
recording_grace_secs = 300

[log]
level = "debug"

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.bearer_token.as_deref(), Some("control-token"));
    assert_eq!(config.storage.database_path, "/tmp/doorstep.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.queue.lease_secs, 60);
    assert_eq!(config.queue.recording_workers, 4);
    assert_eq!(config.queue.max_attempts, 3, "unset keys keep defaults");
    assert_eq!(config.telephony.account_sid.as_deref(), Some("AC123"));
    assert_eq!(config.media.bucket.as_deref(), Some("recordings"));
    assert_eq!(config.speech.language, "es");
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.pipeline.recording_grace_secs, 300);
    assert_eq!(config.log.level, "debug");
    assert!(!config.prometheus.enabled);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    let defaults = DoorstepConfig::default();
    assert_eq!(config.server.port, defaults.server.port);
    assert_eq!(config.queue.lease_secs, 30);
    assert!(config.telephony.auth_token.is_none());
}

#[test]
fn unknown_field_in_section_produces_error() {
    let toml = r#"
[queue]
lease_sec = 10
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("lease_sec"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

#[test]
fn unknown_key_diagnostic_suggests_correction() {
    let toml = r#"
[telephony]
auth_tokn = "abc"
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "auth_tokn");
            assert_eq!(suggestion.as_deref(), Some("auth_token"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn invalid_type_is_reported() {
    let toml = r#"
[server]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn unknown_cache_backend_is_rejected() {
    let toml = r#"
[cache]
backend = "redis-cluster"
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn validation_errors_surface_through_load_and_validate() {
    let toml = r#"
[queue]
max_attempts = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("zero attempts is invalid");
    assert!(
        errors
            .iter()
            .any(|e| e.to_string().contains("queue.max_attempts"))
    );
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
[telephony]
account_sid = "AC-from-file"
"#,
        )?;
        jail.set_env("DOORSTEP_TELEPHONY_AUTH_TOKEN", "env-token");
        jail.set_env("DOORSTEP_TELEPHONY_ACCOUNT_SID", "AC-from-env");
        jail.set_env("DOORSTEP_QUEUE_RECORDING_WORKERS", "3");

        let config = load_config_from_path(std::path::Path::new("custom.toml"))?;
        assert_eq!(config.telephony.account_sid.as_deref(), Some("AC-from-env"));
        assert_eq!(config.telephony.auth_token.as_deref(), Some("env-token"));
        assert_eq!(config.queue.recording_workers, 3);
        Ok(())
    });
}
