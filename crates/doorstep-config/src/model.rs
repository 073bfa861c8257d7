// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Doorstep pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.
//!
//! Credentials are optional everywhere. A section whose credentials are
//! missing disables its adapter instead of failing startup. Structs holding
//! secrets implement `Debug` by hand so secrets never reach the logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level Doorstep configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DoorstepConfig {
    /// HTTP server and public callback settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite data plane settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Job queue and worker pool settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Telephony provider settings.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Object store for recordings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Transcription and analysis provider settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Web push (VAPID) settings.
    #[serde(default)]
    pub push: PushConfig,

    /// Coordinator settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// HTTP server configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind host for the HTTP server.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port for the HTTP server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL. Used to build provider callback URLs
    /// and as the canonical URL for webhook signature validation.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Bearer token for the internal control API. `None` rejects every
    /// control request.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            bearer_token: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("bearer_token", &redacted(&self.bearer_token))
            .finish()
    }
}

impl ServerConfig {
    /// Public base URL without a trailing slash.
    pub fn public_base(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("doorstep").join("doorstep.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("doorstep.db"))
        .to_string_lossy()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// Job queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Lease granted to a reserved job, in seconds.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Interval of the stalled-job sweep, in seconds.
    #[serde(default = "default_stall_check_secs")]
    pub stall_check_secs: u64,

    /// Lease expiries recovered before a job is failed permanently.
    #[serde(default = "default_max_stalls")]
    pub max_stalls: u32,

    /// First retry delay; doubles on every further attempt.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Attempts per job, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Completed jobs retained per kind.
    #[serde(default = "default_keep_completed")]
    pub keep_completed: u32,

    /// Failed jobs retained per kind.
    #[serde(default = "default_keep_failed")]
    pub keep_failed: u32,

    /// Idle worker poll interval, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_call_workers")]
    pub call_workers: usize,

    #[serde(default = "default_recording_workers")]
    pub recording_workers: usize,

    #[serde(default = "default_transcription_workers")]
    pub transcription_workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            stall_check_secs: default_stall_check_secs(),
            max_stalls: default_max_stalls(),
            backoff_base_secs: default_backoff_base_secs(),
            max_attempts: default_max_attempts(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            poll_interval_ms: default_poll_interval_ms(),
            call_workers: default_call_workers(),
            recording_workers: default_recording_workers(),
            transcription_workers: default_transcription_workers(),
        }
    }
}

fn default_lease_secs() -> u64 {
    30
}

fn default_stall_check_secs() -> u64 {
    15
}

fn default_max_stalls() -> u32 {
    1
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_keep_completed() -> u32 {
    10
}

fn default_keep_failed() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_call_workers() -> usize {
    2
}

fn default_recording_workers() -> usize {
    10
}

fn default_transcription_workers() -> usize {
    2
}

/// Telephony provider configuration (Twilio-compatible REST API).
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelephonyConfig {
    /// Provider account identifier. `None` disables telephony.
    #[serde(default)]
    pub account_sid: Option<String>,

    /// Provider auth token; also the webhook signing secret.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Caller number used for calls and SMS (E.164).
    #[serde(default)]
    pub caller_number: Option<String>,

    /// Base URL of the provider REST API.
    #[serde(default = "default_telephony_api_base")]
    pub api_base: String,

    /// Prompt spoken to the customer before recording.
    #[serde(default = "default_voice_prompt")]
    pub voice_prompt: String,

    /// Timeout for call placement requests, in seconds.
    #[serde(default = "default_place_timeout_secs")]
    pub place_timeout_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            caller_number: None,
            api_base: default_telephony_api_base(),
            voice_prompt: default_voice_prompt(),
            place_timeout_secs: default_place_timeout_secs(),
        }
    }
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &redacted(&self.auth_token))
            .field("caller_number", &self.caller_number)
            .field("api_base", &self.api_base)
            .field("voice_prompt", &self.voice_prompt)
            .field("place_timeout_secs", &self.place_timeout_secs)
            .finish()
    }
}

fn default_telephony_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

fn default_voice_prompt() -> String {
    "Hello, this is your delivery service calling about your upcoming delivery. \
     After the beep, please tell us any delivery instructions, such as where to \
     leave the package or a better time. Press the pound key when you are done."
        .to_string()
}

fn default_place_timeout_secs() -> u64 {
    10
}

/// S3-compatible object store configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Object store endpoint, e.g. `https://s3.us-east-1.amazonaws.com`.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub bucket: Option<String>,

    /// Public base URL objects are served from. Defaults to
    /// `<endpoint>/<bucket>`.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Timeout for recording downloads and uploads, in seconds.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            bucket: None,
            public_url: None,
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl fmt::Debug for MediaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("bucket", &self.bucket)
            .field("public_url", &self.public_url)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_download_timeout_secs() -> u64 {
    30
}

/// Transcription and intent analysis provider (OpenAI-compatible API).
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpeechConfig {
    /// API key. `None` disables speech processing.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_speech_api_base")]
    pub api_base: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Language hint for transcription.
    #[serde(default = "default_language")]
    pub language: String,

    /// Timeout for audio download, transcription and analysis, in seconds.
    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_speech_api_base(),
            transcription_model: default_transcription_model(),
            analysis_model: default_analysis_model(),
            language: default_language(),
            timeout_secs: default_speech_timeout_secs(),
        }
    }
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("api_base", &self.api_base)
            .field("transcription_model", &self.transcription_model)
            .field("analysis_model", &self.analysis_model)
            .field("language", &self.language)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_speech_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_analysis_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_speech_timeout_secs() -> u64 {
    30
}

/// Result cache backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Cache table in the SQLite database.
    #[default]
    Sqlite,
    /// Process-local map; lost on restart.
    Memory,
    /// No caching; every request reaches the provider.
    Disabled,
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// TTL for successful results, in seconds.
    #[serde(default = "default_success_ttl_secs")]
    pub success_ttl_secs: u64,

    /// TTL for negative (error) results, in seconds.
    #[serde(default = "default_error_ttl_secs")]
    pub error_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            success_ttl_secs: default_success_ttl_secs(),
            error_ttl_secs: default_error_ttl_secs(),
        }
    }
}

fn default_success_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_error_ttl_secs() -> u64 {
    60 * 60
}

/// Web push configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// VAPID public key (base64url, uncompressed P-256 point).
    #[serde(default)]
    pub vapid_public_key: Option<String>,

    /// VAPID private key (base64url, 32-byte scalar).
    #[serde(default)]
    pub vapid_private_key: Option<String>,

    /// Contact URI sent in the VAPID claims.
    #[serde(default = "default_push_subject")]
    pub subject: String,

    /// Timeout for push service requests, in seconds.
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            subject: default_push_subject(),
            timeout_secs: default_push_timeout_secs(),
        }
    }
}

impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("vapid_public_key", &self.vapid_public_key)
            .field("vapid_private_key", &redacted(&self.vapid_private_key))
            .field("subject", &self.subject)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_push_subject() -> String {
    "mailto:ops@doorstep.local".to_string()
}

fn default_push_timeout_secs() -> u64 {
    5
}

/// Coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// How long after a terminal call status a missing recording is treated
    /// as final, in seconds.
    #[serde(default = "default_recording_grace_secs")]
    pub recording_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recording_grace_secs: default_recording_grace_secs(),
        }
    }
}

fn default_recording_grace_secs() -> u64 {
    120
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn redacted(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DoorstepConfig::default();
        assert_eq!(config.queue.lease_secs, 30);
        assert_eq!(config.queue.stall_check_secs, 15);
        assert_eq!(config.queue.max_stalls, 1);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.keep_completed, 10);
        assert_eq!(config.queue.keep_failed, 5);
        assert_eq!(config.queue.recording_workers, 10);
        assert_eq!(config.telephony.place_timeout_secs, 10);
        assert_eq!(config.media.download_timeout_secs, 30);
        assert_eq!(config.speech.language, "en");
        assert_eq!(config.cache.success_ttl_secs, 86_400);
        assert_eq!(config.cache.error_ttl_secs, 3_600);
        assert_eq!(config.push.timeout_secs, 5);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let telephony = TelephonyConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("super-secret-token".into()),
            ..TelephonyConfig::default()
        };
        let rendered = format!("{telephony:?}");
        assert!(rendered.contains("AC123"));
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("[REDACTED]"));

        let speech = SpeechConfig {
            api_key: Some("sk-live-abc".into()),
            ..SpeechConfig::default()
        };
        assert!(!format!("{speech:?}").contains("sk-live-abc"));
    }

    #[test]
    fn public_base_trims_trailing_slash() {
        let server = ServerConfig {
            public_base_url: "https://hooks.example.com/".into(),
            ..ServerConfig::default()
        };
        assert_eq!(server.public_base(), "https://hooks.example.com");
    }
}
