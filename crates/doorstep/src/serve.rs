// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `doorstep serve` and the operator commands.
//!
//! Wires the SQLite data plane and queue, the provider adapters, the result
//! cache, the notifier and the coordinator, then runs the worker pool next to
//! the HTTP gateway until a shutdown signal arrives.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use doorstep_config::DoorstepConfig;
use doorstep_config::model::CacheBackend;
use doorstep_core::{
    DoorstepError, JobKind, JobQueue, PluginAdapter, QueueStats, ResultCache, StorageAdapter,
};
use doorstep_gateway::{
    AuthConfig, GatewayState, HealthState, ServerConfig, WebhookConfig, start_server,
};
use doorstep_media::{FetchCredentials, S3MediaStore};
use doorstep_notify::{Notifier, PushSender, RealtimeHub, WebPushSender};
use doorstep_pipeline::{Coordinator, PipelineSettings, WorkerPool, WorkerSettings};
use doorstep_prometheus::PrometheusAdapter;
use doorstep_speech::{CacheTtl, CachedSpeech, MemoryCache, OpenAiSpeech};
use doorstep_storage::{QueuePolicy, SqliteStorage};
use doorstep_telephony::TwilioTelephony;
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown;

const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// A fully wired pipeline.
pub struct Pipeline {
    pub storage: Arc<SqliteStorage>,
    pub coordinator: Arc<Coordinator>,
}

/// Opens storage and builds every adapter from configuration.
///
/// Adapters with missing credentials come up disabled and are reported once
/// here; the pipeline degrades around them instead of failing startup.
pub async fn build_pipeline(config: &DoorstepConfig) -> Result<Pipeline, DoorstepError> {
    let storage = SqliteStorage::new(config.storage.clone(), QueuePolicy::from(&config.queue));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");

    let cache: Option<Arc<dyn ResultCache>> = match config.cache.backend {
        CacheBackend::Sqlite => Some(Arc::new(storage.cache()?) as Arc<dyn ResultCache>),
        CacheBackend::Memory => Some(Arc::new(MemoryCache::new()) as Arc<dyn ResultCache>),
        CacheBackend::Disabled => None,
    };
    let storage = Arc::new(storage);

    let telephony = Arc::new(TwilioTelephony::new(&config.telephony)?);
    let fetch_auth = match (&config.telephony.account_sid, &config.telephony.auth_token) {
        (Some(sid), Some(token)) => Some(FetchCredentials {
            username: sid.clone(),
            password: token.clone(),
        }),
        _ => None,
    };
    let media = Arc::new(S3MediaStore::new(&config.media, fetch_auth)?);
    let speech = Arc::new(OpenAiSpeech::new(&config.speech)?);
    let push = Arc::new(WebPushSender::new(&config.push)?);

    let adapters: [&dyn PluginAdapter; 3] = [telephony.as_ref(), media.as_ref(), speech.as_ref()];
    for adapter in adapters {
        if adapter.is_enabled() {
            debug!(adapter = adapter.name(), "adapter enabled");
        } else {
            warn!(adapter = adapter.name(), "adapter disabled, credentials missing");
        }
    }
    if !push.is_enabled() {
        warn!(adapter = "webpush", "adapter disabled, credentials missing");
    }

    let hub = Arc::new(RealtimeHub::new());
    let notifier = Arc::new(Notifier::new(
        storage.clone(),
        push,
        telephony.clone(),
        hub,
    ));
    let ttl = CacheTtl {
        success: Duration::from_secs(config.cache.success_ttl_secs),
        error: Duration::from_secs(config.cache.error_ttl_secs),
    };
    let coordinator = Arc::new(Coordinator::new(
        storage.clone(),
        storage.clone(),
        telephony,
        media,
        CachedSpeech::new(speech, cache, ttl),
        notifier,
        PipelineSettings::from_config(config),
    ));

    Ok(Pipeline {
        storage,
        coordinator,
    })
}

/// Runs the `serve` command.
///
/// Starts workers and the HTTP gateway, and supports graceful shutdown via
/// signal handlers: workers finish the job in hand before the process exits.
pub async fn run_serve(config: DoorstepConfig) -> Result<(), DoorstepError> {
    init_tracing(&config.log.level);

    let prometheus = if config.prometheus.enabled {
        match PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(Arc::new(adapter))
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };
    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> = prometheus
        .as_ref()
        .map(|adapter| {
            let adapter = adapter.clone();
            Arc::new(move || adapter.render()) as Arc<dyn Fn() -> String + Send + Sync>
        });

    let pipeline = build_pipeline(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let workers = WorkerPool::new(
        pipeline.coordinator.clone(),
        WorkerSettings::from(&config.queue),
    );
    let worker_cancel = cancel.clone();
    let worker_task = tokio::spawn(async move { workers.run(worker_cancel).await });

    let mem_cancel = cancel.clone();
    tokio::spawn(async move { memory_monitor(mem_cancel).await });

    let state = GatewayState {
        coordinator: pipeline.coordinator.clone(),
        webhooks: WebhookConfig {
            public_base_url: config.server.public_base().to_string(),
            voice_prompt: config.telephony.voice_prompt.clone(),
        },
        auth: AuthConfig {
            bearer_token: config.server.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
    };
    if config.server.bearer_token.is_none() {
        warn!("no bearer token configured, control API rejects every request");
    }
    let server = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };

    let served = start_server(&server, state, cancel.clone()).await;
    // The gateway only returns early on a bind or accept failure.
    cancel.cancel();
    if let Err(e) = worker_task.await {
        warn!(error = %e, "worker pool task failed");
    }
    if let Err(e) = pipeline.storage.close().await {
        warn!(error = %e, "storage close failed");
    }
    served?;

    info!("doorstep serve shutdown complete");
    Ok(())
}

/// Per-kind queue counters for the `queue-stats` command.
pub async fn queue_stats(
    queue: &dyn JobQueue,
) -> Result<BTreeMap<String, QueueStats>, DoorstepError> {
    let mut stats = BTreeMap::new();
    for kind in JobKind::iter() {
        stats.insert(kind.to_string(), queue.stats(Some(kind)).await?);
    }
    Ok(stats)
}

/// Runs the `queue-stats` command.
pub async fn run_queue_stats(config: DoorstepConfig, json: bool) -> Result<(), DoorstepError> {
    let storage = SqliteStorage::new(config.storage.clone(), QueuePolicy::from(&config.queue));
    storage.initialize().await?;
    let stats = queue_stats(&storage).await?;
    storage.close().await?;

    if json {
        let rendered = serde_json::to_string_pretty(&stats)
            .map_err(|e| DoorstepError::Internal(format!("failed to render stats: {e}")))?;
        println!("{rendered}");
    } else {
        println!(
            "{:<24} {:>8} {:>8} {:>10} {:>8}",
            "KIND", "WAITING", "ACTIVE", "COMPLETED", "FAILED"
        );
        for (kind, s) in &stats {
            println!(
                "{:<24} {:>8} {:>8} {:>10} {:>8}",
                kind, s.waiting, s.active, s.completed, s.failed
            );
        }
    }
    Ok(())
}

/// Runs the `reprocess` command: enqueues a gap-filling reprocess job that a
/// running `serve` instance picks up.
pub async fn run_reprocess(config: DoorstepConfig, recording_id: &str) -> Result<(), DoorstepError> {
    init_tracing(&config.log.level);
    let pipeline = build_pipeline(&config).await?;
    let job_id = pipeline.coordinator.reprocess(recording_id).await?;
    pipeline.storage.close().await?;
    println!("queued reprocess job {job_id} for recording {recording_id}");
    Ok(())
}

/// Samples jemalloc statistics into the memory gauges.
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(cancel: CancellationToken) {
    let mut interval = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Stats are cached per epoch.
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
                doorstep_prometheus::set_memory(allocated as u64, resident as u64);
            }
            _ = cancel.cancelled() => {
                debug!("memory monitor shutting down");
                break;
            }
        }
    }
}

/// Stub memory monitor for MSVC (no jemalloc).
#[cfg(target_env = "msvc")]
async fn memory_monitor(cancel: CancellationToken) {
    let _ = MEMORY_SAMPLE_INTERVAL;
    cancel.cancelled().await;
}

/// Initializes the tracing subscriber with the configured log level.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("doorstep={log_level},warn")));

    // try_init: a second command in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorstep_core::{EnqueueOptions, InitiateCallPayload, JobPayload};

    fn temp_config(dir: &tempfile::TempDir) -> DoorstepConfig {
        let mut config = DoorstepConfig::default();
        config.storage.database_path = dir.path().join("doorstep.db").to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn pipeline_builds_with_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        let pipeline = build_pipeline(&config).await.unwrap();
        assert!(!pipeline.coordinator.telephony().is_enabled());
        assert!(!pipeline.coordinator.media().is_enabled());
        assert!(!pipeline.coordinator.notifier().push_enabled());
        assert!(
            pipeline
                .coordinator
                .data()
                .get_delivery("missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn pipeline_builds_with_every_cache_backend() {
        for backend in [CacheBackend::Sqlite, CacheBackend::Memory, CacheBackend::Disabled] {
            let dir = tempfile::tempdir().unwrap();
            let mut config = temp_config(&dir);
            config.cache.backend = backend;
            assert!(build_pipeline(&config).await.is_ok(), "{backend:?}");
        }
    }

    #[tokio::test]
    async fn queue_stats_lists_every_kind() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        let pipeline = build_pipeline(&config).await.unwrap();
        pipeline
            .coordinator
            .queue()
            .enqueue(
                &JobPayload::InitiateCall(InitiateCallPayload {
                    delivery_id: "D1".into(),
                }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let stats = queue_stats(pipeline.storage.as_ref()).await.unwrap();
        assert_eq!(stats.len(), JobKind::iter().count());
        assert_eq!(stats["initiate-call"].waiting, 1);
        assert_eq!(stats["process-recording"].waiting, 0);
    }
}
