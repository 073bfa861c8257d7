// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transcription and analysis provider.
//!
//! Transcriptions come from a script, then a default text. Analysis reads
//! the text with the keyword grammar so expectations stay predictable.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use doorstep_core::types::timestamp;
use doorstep_core::{
    AdapterType, AnalysisOutcome, AnalysisResult, DoorstepError, HealthStatus, PluginAdapter,
    SpeechAdapter, TranscriptionOutcome, TranscriptionResult,
};
use doorstep_speech::analyze_fallback;

/// How the mock answers analysis requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// The provider returned well-formed JSON.
    Json,
    /// The provider answered with prose; the keyword grammar took over.
    Malformed,
    /// The provider failed.
    Fail { retryable: bool },
}

/// A scripted speech adapter.
pub struct MockSpeech {
    enabled: bool,
    default_text: String,
    script: Mutex<VecDeque<TranscriptionOutcome>>,
    analysis: Mutex<AnalysisMode>,
    transcribe_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
}

impl MockSpeech {
    /// Transcribes every recording as `default_text`.
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            enabled: true,
            default_text: default_text.into(),
            script: Mutex::new(VecDeque::new()),
            analysis: Mutex::new(AnalysisMode::Json),
            transcribe_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new("")
        }
    }

    /// Queues an outcome for the next transcription ahead of the default.
    pub fn script_transcription(&self, outcome: TranscriptionOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn set_analysis(&self, mode: AnalysisMode) {
        *self.analysis.lock().unwrap() = mode;
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new("leave at the door urgent")
    }
}

#[async_trait]
impl PluginAdapter for MockSpeech {
    fn name(&self) -> &str {
        "mock-speech"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
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
impl SpeechAdapter for MockSpeech {
    async fn transcribe(&self, _audio_url: &str, recording_id: &str) -> TranscriptionResult {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if !self.enabled {
            TranscriptionOutcome::TranscriptionFailed {
                reason: "AI service not available".into(),
                retryable: false,
            }
        } else {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| TranscriptionOutcome::Transcribed {
                    text: self.default_text.clone(),
                })
        };
        TranscriptionResult {
            recording_id: recording_id.to_string(),
            processed_at: timestamp(),
            outcome,
        }
    }

    async fn analyze(&self, text: &str, recording_id: &str) -> AnalysisResult {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.analysis.lock().unwrap();
        let outcome = match mode {
            _ if !self.enabled => AnalysisOutcome::AnalysisFailed {
                reason: "AI service not available".into(),
                retryable: false,
            },
            AnalysisMode::Json => AnalysisOutcome::Analyzed {
                intent: analyze_fallback(text),
            },
            AnalysisMode::Malformed => AnalysisOutcome::AnalyzedByFallback {
                intent: analyze_fallback(text),
            },
            AnalysisMode::Fail { retryable } => AnalysisOutcome::AnalysisFailed {
                reason: "injected analysis failure".into(),
                retryable,
            },
        };
        AnalysisResult {
            recording_id: recording_id.to_string(),
            processed_at: timestamp(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorstep_core::Priority;

    #[tokio::test]
    async fn script_runs_before_default() {
        let speech = MockSpeech::new("default words");
        speech.script_transcription(TranscriptionOutcome::TranscriptionFailed {
            reason: "timeout".into(),
            retryable: true,
        });
        assert!(!speech.transcribe("u", "R1").await.success());
        assert_eq!(speech.transcribe("u", "R1").await.text(), Some("default words"));
        assert_eq!(speech.transcribe_calls(), 2);
    }

    #[tokio::test]
    async fn analysis_modes() {
        let speech = MockSpeech::default();
        let result = speech.analyze("urgent please", "R1").await;
        assert_eq!(result.intent().unwrap().priority, Priority::Urgent);

        speech.set_analysis(AnalysisMode::Fail { retryable: true });
        assert!(!speech.analyze("urgent please", "R1").await.success());
        assert_eq!(speech.analyze_calls(), 2);
    }
}
