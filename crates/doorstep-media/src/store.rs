// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! S3-compatible media store.

use std::time::Duration;

use async_trait::async_trait;
use doorstep_config::model::MediaConfig;
use doorstep_core::types::epoch_ms;
use doorstep_core::{AdapterType, DoorstepError, HealthStatus, MediaStore, PluginAdapter};
use tracing::{debug, info, warn};

use crate::sigv4::{self, CanonicalRequest, SigningKey};

const PROVIDER: &str = "media";

/// Basic-auth credentials for downloading provider recordings.
#[derive(Clone)]
pub struct FetchCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
struct Bucket {
    endpoint: String,
    region: String,
    name: String,
    access_key_id: String,
    secret_access_key: String,
    public_url: String,
}

/// Downloads recordings over HTTP and uploads them with path-style PUTs.
///
/// Without endpoint, bucket and keys the store is disabled: [`MediaStore::persist`]
/// returns [`DoorstepError::Disabled`] and the caller keeps the provider URL.
/// Downloads work either way.
pub struct S3MediaStore {
    http: reqwest::Client,
    timeout: Duration,
    bucket: Option<Bucket>,
    fetch_auth: Option<FetchCredentials>,
}

impl S3MediaStore {
    pub fn new(
        config: &MediaConfig,
        fetch_auth: Option<FetchCredentials>,
    ) -> Result<Self, DoorstepError> {
        let timeout = Duration::from_secs(config.download_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DoorstepError::Provider {
                provider: PROVIDER,
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            })?;

        let bucket = match (
            &config.endpoint,
            &config.bucket,
            &config.access_key_id,
            &config.secret_access_key,
        ) {
            (Some(endpoint), Some(name), Some(key_id), Some(secret)) => {
                let endpoint = endpoint.trim_end_matches('/').to_string();
                let public_url = config
                    .public_url
                    .as_deref()
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| format!("{endpoint}/{name}"));
                info!(endpoint = %endpoint, bucket = %name, "media store initialized");
                Some(Bucket {
                    endpoint,
                    region: config.region.clone(),
                    name: name.clone(),
                    access_key_id: key_id.clone(),
                    secret_access_key: secret.clone(),
                    public_url,
                })
            }
            _ => {
                warn!("media store not configured, recordings keep provider URLs");
                None
            }
        };

        Ok(Self {
            http,
            timeout,
            bucket,
            fetch_auth,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> DoorstepError {
        if e.is_timeout() {
            return DoorstepError::Timeout {
                duration: self.timeout,
            };
        }
        DoorstepError::Provider {
            provider: PROVIDER,
            message: format!("HTTP request failed: {e}"),
            retryable: true,
            source: Some(Box::new(e)),
        }
    }
}

/// `recordings/<epoch_ms>-<name>` with the name reduced to safe characters.
pub fn object_key(name: &str, at_ms: i64) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("recordings/{at_ms}-{safe}")
}

fn status_error(status: reqwest::StatusCode, body: &str, action: &str) -> DoorstepError {
    let message = format!("{action} returned {status}: {body}");
    if status.as_u16() == 429 || status.is_server_error() {
        DoorstepError::transient(PROVIDER, message)
    } else {
        DoorstepError::permanent(PROVIDER, message)
    }
}

#[async_trait]
impl PluginAdapter for S3MediaStore {
    fn name(&self) -> &str {
        "s3"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaStore
    }

    fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        if self.is_enabled() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded("object store not configured".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        Ok(())
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, DoorstepError> {
        let mut request = self.http.get(source_url);
        if let Some(auth) = &self.fetch_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        let response = request.send().await.map_err(|e| self.request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, "recording download"));
        }
        let bytes = response.bytes().await.map_err(|e| self.request_error(e))?;
        debug!(url = source_url, bytes = bytes.len(), "recording downloaded");
        Ok(bytes.to_vec())
    }

    async fn persist(&self, audio: Vec<u8>, name: &str) -> Result<String, DoorstepError> {
        let bucket = self
            .bucket
            .as_ref()
            .ok_or(DoorstepError::Disabled { adapter: "media store" })?;

        let key = object_key(name, epoch_ms());
        let path = format!("/{}/{}", sigv4::uri_encode(&bucket.name, false), sigv4::uri_encode(&key, true));
        let url = format!("{}{path}", bucket.endpoint);
        let host = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{h}:{port}"),
                    None => h.to_string(),
                })
            })
            .ok_or_else(|| DoorstepError::Config(format!("invalid media endpoint: {}", bucket.endpoint)))?;

        let now = chrono::Utc::now();
        let date = sigv4::amz_date(now);
        let payload_hash = sigv4::sha256_hex(&audio);
        let headers = [
            ("content-type", "audio/wav"),
            ("host", host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", date.as_str()),
        ];
        let authorization = sigv4::authorization(
            &SigningKey {
                access_key_id: &bucket.access_key_id,
                secret_access_key: &bucket.secret_access_key,
                region: &bucket.region,
                service: "s3",
            },
            &CanonicalRequest {
                method: "PUT",
                path: &path,
                query: "",
                headers: &headers,
                payload_hash: &payload_hash,
            },
            now,
        )
        .ok_or_else(|| DoorstepError::Internal("failed to sign upload request".into()))?;

        let response = self
            .http
            .put(&url)
            .header("content-type", "audio/wav")
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &date)
            .header("authorization", authorization)
            .body(audio)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, "upload"));
        }

        let public = format!("{}/{}", bucket.public_url, sigv4::uri_encode(&key, true));
        debug!(key = %key, url = %public, "recording persisted");
        Ok(public)
    }
}
