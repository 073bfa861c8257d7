// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result caching in front of a [`SpeechAdapter`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use doorstep_core::{
    AnalysisOutcome, AnalysisResult, ResultCache, SpeechAdapter, TranscriptionOutcome,
    TranscriptionResult,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Cache key of a recording's transcription.
pub fn transcription_key(recording_id: &str) -> String {
    format!("transcription:{recording_id}")
}

/// Cache key of a recording's analysis.
pub fn analysis_key(recording_id: &str) -> String {
    format!("analysis:{recording_id}")
}

/// Process-local cache with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (serde_json::Value, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        self.entries
            .remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        self.entries.get(key).map(|entry| entry.0.clone())
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> bool {
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            return false;
        };
        self.entries
            .insert(key.to_string(), (value.clone(), expires_at));
        true
    }

    async fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }
}

/// TTLs applied by [`CachedSpeech`].
#[derive(Debug, Clone, Copy)]
pub struct CacheTtl {
    pub success: Duration,
    pub error: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            success: Duration::from_secs(24 * 60 * 60),
            error: Duration::from_secs(60 * 60),
        }
    }
}

/// Cache-through wrapper around a speech adapter.
///
/// Successful results are kept for the success TTL. A failure is cached for
/// the error TTL only when it is final: not retryable, or produced on the
/// job's last attempt. Earlier retryable failures are not cached so the queue
/// retry reaches the provider again. Results from a disabled adapter are
/// never cached.
pub struct CachedSpeech {
    inner: Arc<dyn SpeechAdapter>,
    cache: Option<Arc<dyn ResultCache>>,
    ttl: CacheTtl,
}

impl CachedSpeech {
    pub fn new(
        inner: Arc<dyn SpeechAdapter>,
        cache: Option<Arc<dyn ResultCache>>,
        ttl: CacheTtl,
    ) -> Self {
        Self { inner, cache, ttl }
    }

    /// The wrapped adapter.
    pub fn adapter(&self) -> &Arc<dyn SpeechAdapter> {
        &self.inner
    }

    pub async fn transcribe(
        &self,
        audio_url: &str,
        recording_id: &str,
        final_attempt: bool,
    ) -> TranscriptionResult {
        let key = transcription_key(recording_id);
        if let Some(hit) = self.lookup::<TranscriptionResult>(&key).await {
            return hit;
        }

        let result = self.inner.transcribe(audio_url, recording_id).await;
        let ttl = match &result.outcome {
            TranscriptionOutcome::Transcribed { .. } => Some(self.ttl.success),
            TranscriptionOutcome::TranscriptionFailed { retryable, .. } => {
                (final_attempt || !retryable).then_some(self.ttl.error)
            }
        };
        self.store(&key, &result, ttl).await;
        result
    }

    pub async fn analyze(&self, text: &str, recording_id: &str, final_attempt: bool) -> AnalysisResult {
        let key = analysis_key(recording_id);
        if let Some(hit) = self.lookup::<AnalysisResult>(&key).await {
            return hit;
        }

        let result = self.inner.analyze(text, recording_id).await;
        let ttl = match &result.outcome {
            AnalysisOutcome::Analyzed { .. } | AnalysisOutcome::AnalyzedByFallback { .. } => {
                Some(self.ttl.success)
            }
            AnalysisOutcome::AnalysisFailed { retryable, .. } => {
                (final_attempt || !retryable).then_some(self.ttl.error)
            }
        };
        self.store(&key, &result, ttl).await;
        result
    }

    /// Drops both cached results for a recording.
    pub async fn invalidate(&self, recording_id: &str) {
        if let Some(cache) = &self.cache {
            cache.remove(&transcription_key(recording_id)).await;
            cache.remove(&analysis_key(recording_id)).await;
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        let value = cache.get(key).await?;
        match serde_json::from_value(value) {
            Ok(hit) => {
                debug!(key, "speech cache hit");
                Some(hit)
            }
            Err(e) => {
                debug!(key, error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, result: &T, ttl: Option<Duration>) {
        let (Some(cache), Some(ttl)) = (&self.cache, ttl) else {
            return;
        };
        if !self.inner.is_enabled() {
            return;
        }
        if let Ok(value) = serde_json::to_value(result) {
            cache.set(key, &value, ttl).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use doorstep_core::types::timestamp;
    use doorstep_core::{AdapterType, DoorstepError, HealthStatus, Intent, PluginAdapter};

    /// Counts calls and fails transcription while `failures` is positive.
    struct Scripted {
        calls: AtomicUsize,
        failures: AtomicUsize,
        retryable: bool,
        enabled: bool,
    }

    impl Scripted {
        fn new(failures: usize, retryable: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(failures),
                retryable,
                enabled: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PluginAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Speech
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), DoorstepError> {
            Ok(())
        }
    }

    #[async_trait]
    impl SpeechAdapter for Scripted {
        async fn transcribe(&self, _audio_url: &str, recording_id: &str) -> TranscriptionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let outcome = if failing {
                TranscriptionOutcome::TranscriptionFailed {
                    reason: "boom".into(),
                    retryable: self.retryable,
                }
            } else {
                TranscriptionOutcome::Transcribed {
                    text: "leave at door".into(),
                }
            };
            TranscriptionResult {
                recording_id: recording_id.to_string(),
                processed_at: timestamp(),
                outcome,
            }
        }

        async fn analyze(&self, _text: &str, recording_id: &str) -> AnalysisResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AnalysisResult {
                recording_id: recording_id.to_string(),
                processed_at: timestamp(),
                outcome: AnalysisOutcome::Analyzed {
                    intent: Intent::default(),
                },
            }
        }
    }

    fn wrap(inner: Arc<Scripted>) -> (CachedSpeech, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let speech = CachedSpeech::new(inner, Some(cache.clone()), CacheTtl::default());
        (speech, cache)
    }

    #[tokio::test]
    async fn success_is_served_from_cache() {
        let inner = Arc::new(Scripted::new(0, true));
        let (speech, _) = wrap(inner.clone());
        let first = speech.transcribe("u", "R1", false).await;
        let second = speech.transcribe("u", "R1", false).await;
        assert_eq!(first, second);
        assert_eq!(inner.calls(), 1);

        speech.analyze("t", "R1", false).await;
        speech.analyze("t", "R1", false).await;
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn retryable_failure_is_not_cached_before_last_attempt() {
        let inner = Arc::new(Scripted::new(1, true));
        let (speech, cache) = wrap(inner.clone());
        assert!(!speech.transcribe("u", "R1", false).await.success());
        assert!(cache.is_empty());
        assert!(speech.transcribe("u", "R1", false).await.success());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn final_failure_is_negative_cached() {
        let inner = Arc::new(Scripted::new(1, true));
        let (speech, _) = wrap(inner.clone());
        assert!(!speech.transcribe("u", "R1", true).await.success());
        assert!(!speech.transcribe("u", "R1", false).await.success());
        assert_eq!(inner.calls(), 1);

        speech.invalidate("R1").await;
        assert!(speech.transcribe("u", "R1", false).await.success());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_cached_immediately() {
        let inner = Arc::new(Scripted::new(1, false));
        let (speech, cache) = wrap(inner.clone());
        speech.transcribe("u", "R1", false).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn disabled_adapter_results_are_not_cached() {
        let mut scripted = Scripted::new(1, false);
        scripted.enabled = false;
        let (speech, cache) = wrap(Arc::new(scripted));
        speech.transcribe("u", "R1", true).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        let value = serde_json::json!({"a": 1});
        assert!(cache.set("k", &value, Duration::ZERO).await);
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty());

        assert!(cache.set("k", &value, Duration::from_secs(60)).await);
        assert_eq!(cache.get("k").await, Some(value));
        assert!(cache.remove("k").await);
        assert!(!cache.remove("k").await);
    }

    #[tokio::test]
    async fn works_without_a_cache() {
        let inner = Arc::new(Scripted::new(0, true));
        let speech = CachedSpeech::new(inner.clone(), None, CacheTtl::default());
        speech.transcribe("u", "R1", false).await;
        speech.transcribe("u", "R1", false).await;
        assert_eq!(inner.calls(), 2);
    }
}
