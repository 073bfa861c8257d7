// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Missing credentials are not validation errors; they disable the owning
//! adapter at startup.

use crate::diagnostic::ConfigError;
use crate::model::DoorstepConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns all collected validation errors (does not fail fast).
pub fn validate_config(config: &DoorstepConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    let base = config.server.public_base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        fail(format!(
            "server.public_base_url must start with http:// or https://, got `{base}`"
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let queue = &config.queue;
    for (name, value) in [
        ("queue.lease_secs", queue.lease_secs),
        ("queue.stall_check_secs", queue.stall_check_secs),
        ("queue.backoff_base_secs", queue.backoff_base_secs),
        ("queue.poll_interval_ms", queue.poll_interval_ms),
    ] {
        if value == 0 {
            fail(format!("{name} must be greater than zero"));
        }
    }
    if queue.max_attempts == 0 {
        fail("queue.max_attempts must be at least 1".to_string());
    }
    for (name, value) in [
        ("queue.call_workers", queue.call_workers),
        ("queue.recording_workers", queue.recording_workers),
        ("queue.transcription_workers", queue.transcription_workers),
    ] {
        if value == 0 {
            fail(format!("{name} must be at least 1"));
        }
    }

    for (name, value) in [
        ("telephony.place_timeout_secs", config.telephony.place_timeout_secs),
        ("media.download_timeout_secs", config.media.download_timeout_secs),
        ("speech.timeout_secs", config.speech.timeout_secs),
        ("push.timeout_secs", config.push.timeout_secs),
    ] {
        if value == 0 {
            fail(format!("{name} must be greater than zero"));
        }
    }

    if let Some(endpoint) = &config.media.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            fail(format!(
                "media.endpoint must start with http:// or https://, got `{endpoint}`"
            ));
        }
    }

    let level = config.log.level.to_ascii_lowercase();
    if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
        fail(format!(
            "log.level must be one of trace, debug, info, warn, error; got `{}`",
            config.log.level
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &DoorstepConfig) -> Vec<String> {
        validate_config(config)
            .err()
            .unwrap_or_default()
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&DoorstepConfig::default()).is_ok());
    }

    #[test]
    fn missing_credentials_are_not_errors() {
        let config = DoorstepConfig::default();
        assert!(config.telephony.auth_token.is_none());
        assert!(config.media.secret_access_key.is_none());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = DoorstepConfig::default();
        config.storage.database_path = " ".into();
        config.queue.lease_secs = 0;
        config.queue.recording_workers = 0;
        config.server.public_base_url = "hooks.example.com".into();

        let msgs = messages(&config);
        assert_eq!(msgs.len(), 4, "{msgs:?}");
        assert!(msgs.iter().any(|m| m.contains("queue.lease_secs")));
        assert!(msgs.iter().any(|m| m.contains("public_base_url")));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = DoorstepConfig::default();
        config.log.level = "loud".into();
        assert!(messages(&config)[0].contains("log.level"));
    }
}
