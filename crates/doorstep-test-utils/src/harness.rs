// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` wires a temp-file SQLite data plane and queue, the real
//! coordinator and worker pool, and the gateway router to mock providers.
//! `drain()` runs queued jobs to completion without timers, and the request
//! helpers sign webhooks the way the provider would.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use strum::IntoEnumIterator;
use tower::ServiceExt;

use doorstep_config::model::StorageConfig;
use doorstep_core::types::timestamp;
use doorstep_core::{
    Agent, Customer, DataPlane, Delivery, DeliveryStatus, DoorstepError, JobKind, ResultCache,
    StorageAdapter,
};
use doorstep_gateway::{AuthConfig, GatewayState, HealthState, WebhookConfig, build_router};
use doorstep_notify::{Notifier, RealtimeHub};
use doorstep_pipeline::{Coordinator, JobRun, PipelineSettings, WorkerPool, WorkerSettings};
use doorstep_speech::{CacheTtl, CachedSpeech};
use doorstep_storage::{QueuePolicy, SqliteStorage};

use crate::{MockMediaStore, MockPushSender, MockSpeech, MockTelephony};

/// Public base URL the harness signs webhooks against.
pub const CALLBACK_BASE: &str = "https://hooks.test";
/// Bearer token accepted by the harness control API.
pub const BEARER_TOKEN: &str = "test-bearer";
/// Prompt served by the voice webhook.
pub const VOICE_PROMPT: &str = "Please leave a message for your driver.";

/// Jobs a single `drain()` may settle before giving up.
const DRAIN_LIMIT: usize = 200;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    telephony: MockTelephony,
    media: MockMediaStore,
    speech: MockSpeech,
    push: MockPushSender,
    max_attempts: u32,
    recording_grace: Duration,
    cache_results: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            telephony: MockTelephony::new(),
            media: MockMediaStore::new(),
            speech: MockSpeech::default(),
            push: MockPushSender::new(),
            max_attempts: 3,
            recording_grace: Duration::from_secs(120),
            cache_results: true,
        }
    }

    pub fn with_telephony(mut self, telephony: MockTelephony) -> Self {
        self.telephony = telephony;
        self
    }

    pub fn with_media(mut self, media: MockMediaStore) -> Self {
        self.media = media;
        self
    }

    pub fn with_speech(mut self, speech: MockSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_push(mut self, push: MockPushSender) -> Self {
        self.push = push;
        self
    }

    /// Attempt budget per job.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_recording_grace(mut self, grace: Duration) -> Self {
        self.recording_grace = grace;
        self
    }

    /// Runs speech without the result cache.
    pub fn without_cache(mut self) -> Self {
        self.cache_results = false;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, DoorstepError> {
        let temp_dir = tempfile::TempDir::new().map_err(DoorstepError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let policy = QueuePolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::ZERO,
            ..QueuePolicy::default()
        };
        let storage = SqliteStorage::new(
            StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            },
            policy,
        );
        storage.initialize().await?;
        let cache: Option<Arc<dyn ResultCache>> = if self.cache_results {
            Some(Arc::new(storage.cache()?) as Arc<dyn ResultCache>)
        } else {
            None
        };
        let storage = Arc::new(storage);

        let telephony = Arc::new(self.telephony);
        let media = Arc::new(self.media);
        let speech = Arc::new(self.speech);
        let push = Arc::new(self.push);
        let hub = Arc::new(RealtimeHub::new());

        let notifier = Arc::new(Notifier::new(
            storage.clone(),
            push.clone(),
            telephony.clone(),
            hub.clone(),
        ));
        let coordinator = Arc::new(Coordinator::new(
            storage.clone(),
            storage.clone(),
            telephony.clone(),
            media.clone(),
            CachedSpeech::new(speech.clone(), cache, CacheTtl::default()),
            notifier,
            PipelineSettings {
                callback_base: CALLBACK_BASE.to_string(),
                recording_grace: self.recording_grace,
            },
        ));
        let workers = WorkerPool::new(
            coordinator.clone(),
            WorkerSettings {
                lease: Duration::from_secs(30),
                poll_interval: Duration::from_millis(10),
                stall_check: Duration::from_secs(15),
                concurrency: JobKind::iter().map(|kind| (kind, 1)).collect(),
            },
        );

        Ok(TestHarness {
            storage,
            telephony,
            media,
            speech,
            push,
            hub,
            coordinator,
            workers,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline wired to mock providers.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    pub telephony: Arc<MockTelephony>,
    pub media: Arc<MockMediaStore>,
    pub speech: Arc<MockSpeech>,
    pub push: Arc<MockPushSender>,
    pub hub: Arc<RealtimeHub>,
    pub coordinator: Arc<Coordinator>,
    pub workers: WorkerPool,
    /// Keep the temp directory alive for the harness lifetime.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default mocks.
    pub async fn new() -> Result<Self, DoorstepError> {
        Self::builder().build().await
    }

    /// Inserts an agent reachable over push and SMS.
    pub async fn seed_agent(&self, agent_id: &str) -> Result<Agent, DoorstepError> {
        let agent = Agent {
            id: agent_id.to_string(),
            name: format!("Agent {agent_id}"),
            phone: Some("+15550009999".to_string()),
            push_subscription: Some(
                serde_json::json!({
                    "endpoint": format!("https://push.test/{agent_id}"),
                    "keys": {"p256dh": "test-p256dh", "auth": "test-auth"}
                })
                .to_string(),
            ),
        };
        self.storage.insert_agent(&agent).await?;
        Ok(agent)
    }

    /// Inserts a scheduled delivery, with its own customer, assigned to
    /// `agent_id`.
    pub async fn seed_delivery(
        &self,
        delivery_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Delivery, DoorstepError> {
        let customer = Customer {
            id: format!("cust-{delivery_id}"),
            name: "Test Customer".to_string(),
            phone: "+15550001111".to_string(),
        };
        self.storage.insert_customer(&customer).await?;
        let now = timestamp();
        let delivery = Delivery {
            id: delivery_id.to_string(),
            customer_id: customer.id,
            agent_id: agent_id.map(str::to_string),
            address: "12 Test Lane".to_string(),
            scheduled_at: now.clone(),
            status: DeliveryStatus::Scheduled,
            created_at: now.clone(),
            updated_at: now,
        };
        self.storage.insert_delivery(&delivery).await?;
        Ok(delivery)
    }

    /// Runs every visible job, kind by kind, until the queue is idle.
    /// Retries are visible immediately since the harness backoff is zero.
    pub async fn drain(&self) -> Result<Vec<JobRun>, DoorstepError> {
        let mut runs = Vec::new();
        loop {
            let mut progressed = false;
            for kind in JobKind::iter() {
                while let Some(run) = self.workers.run_next(kind).await? {
                    runs.push(run);
                    progressed = true;
                    if runs.len() >= DRAIN_LIMIT {
                        return Err(DoorstepError::Internal(format!(
                            "queue did not drain within {DRAIN_LIMIT} jobs"
                        )));
                    }
                }
            }
            if !progressed {
                return Ok(runs);
            }
        }
    }

    /// Gateway state as the binary would build it, minus metrics.
    pub fn gateway_state(&self) -> GatewayState {
        GatewayState {
            coordinator: self.coordinator.clone(),
            webhooks: WebhookConfig {
                public_base_url: CALLBACK_BASE.to_string(),
                voice_prompt: VOICE_PROMPT.to_string(),
            },
            auth: AuthConfig {
                bearer_token: Some(BEARER_TOKEN.to_string()),
            },
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render: None,
            },
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.gateway_state())
    }

    /// A webhook request signed for `path_and_query` with form `params`.
    pub fn webhook_request(&self, path_and_query: &str, params: &[(&str, &str)]) -> Request<Body> {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let signature = self
            .telephony
            .sign(&format!("{CALLBACK_BASE}{path_and_query}"), &params);
        Request::builder()
            .method(Method::POST)
            .uri(path_and_query)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-twilio-signature", signature)
            .body(Body::from(form_encode(&params)))
            .expect("webhook request")
    }

    /// An authenticated control API request.
    pub fn api_request(
        &self,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {BEARER_TOKEN}"));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("api request")
    }

    /// Sends a request through a fresh router; returns status and body text.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Signs and sends a webhook.
    pub async fn post_webhook(
        &self,
        path_and_query: &str,
        params: &[(&str, &str)],
    ) -> (StatusCode, String) {
        self.send(self.webhook_request(path_and_query, params)).await
    }
}

/// `application/x-www-form-urlencoded` body for `params`.
fn form_encode(params: &[(String, String)]) -> String {
    let mut url = reqwest::Url::parse("http://form.invalid/").expect("static url");
    url.query_pairs_mut().extend_pairs(params.iter());
    url.query().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_and_drains_empty_queue() {
        let harness = TestHarness::new().await.unwrap();
        assert!(harness.drain().await.unwrap().is_empty());
    }

    #[test]
    fn form_encoding_escapes_values() {
        let body = form_encode(&[
            ("CallSid".to_string(), "CA1".to_string()),
            ("TranscriptionText".to_string(), "leave it & go".to_string()),
        ]);
        assert_eq!(body, "CallSid=CA1&TranscriptionText=leave+it+%26+go");
    }
}
