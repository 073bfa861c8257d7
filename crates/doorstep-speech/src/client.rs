// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible transcription and intent analysis adapter.

use std::time::Duration;

use async_trait::async_trait;
use doorstep_config::model::SpeechConfig;
use doorstep_core::types::timestamp;
use doorstep_core::{
    AdapterType, AnalysisOutcome, AnalysisResult, DoorstepError, HealthStatus, PluginAdapter,
    SpeechAdapter, TranscriptionOutcome, TranscriptionResult,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::fallback::analyze_fallback;
use crate::prompt::{ANALYSIS_PROMPT, parse_intent_response};

/// Reason reported by a speech adapter built without an API key.
pub const UNAVAILABLE: &str = "AI service not available";

/// A failed step: reason plus whether a queue retry may help.
#[derive(Debug)]
struct StepError {
    reason: String,
    retryable: bool,
}

impl StepError {
    fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }

    fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    fn from_request(what: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::transient(format!("{what} timed out"))
        } else {
            Self::transient(format!("{what} failed: {e}"))
        }
    }

    fn from_status(what: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let reason = format!("{what} returned {status}: {body}");
        if status.as_u16() == 429 || status.is_server_error() {
            Self::transient(reason)
        } else {
            Self::permanent(reason)
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
struct Credentials {
    api_key: String,
}

/// Speech adapter speaking the OpenAI audio and chat completion APIs.
pub struct OpenAiSpeech {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    api_base: String,
    transcription_model: String,
    analysis_model: String,
    language: String,
}

impl OpenAiSpeech {
    /// Creates the adapter. Without an API key it is disabled and every
    /// operation fails with [`UNAVAILABLE`].
    pub fn new(config: &SpeechConfig) -> Result<Self, DoorstepError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DoorstepError::Provider {
                provider: "speech",
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            })?;

        let credentials = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                info!(
                    transcription_model = %config.transcription_model,
                    analysis_model = %config.analysis_model,
                    "speech adapter initialized"
                );
                Some(Credentials {
                    api_key: key.to_string(),
                })
            }
            _ => {
                warn!("speech API key missing, adapter disabled");
                None
            }
        };

        Ok(Self {
            http,
            credentials,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            transcription_model: config.transcription_model.clone(),
            analysis_model: config.analysis_model.clone(),
            language: config.language.clone(),
        })
    }

    async fn download(&self, audio_url: &str) -> Result<Vec<u8>, StepError> {
        let response = self
            .http
            .get(audio_url)
            .send()
            .await
            .map_err(|e| StepError::from_request("audio download", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepError::from_status("audio download", status, &body));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StepError::from_request("audio download", e))?;
        Ok(bytes.to_vec())
    }

    async fn request_transcription(
        &self,
        credentials: &Credentials,
        audio_url: &str,
    ) -> Result<String, StepError> {
        let audio = self.download(audio_url).await?;
        if audio.is_empty() {
            return Err(StepError::permanent("recording audio is empty"));
        }

        let file = Part::bytes(audio)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| StepError::permanent(format!("invalid audio part: {e}")))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.transcription_model.clone())
            .text("language", self.language.clone())
            .text("response_format", "json");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&credentials.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StepError::from_request("transcription", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StepError::from_request("transcription", e))?;
        if !status.is_success() {
            return Err(StepError::from_status("transcription", status, &body));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| StepError::transient(format!("unreadable transcription response: {e}")))?;
        Ok(parsed.text.trim().to_string())
    }

    async fn request_analysis(
        &self,
        credentials: &Credentials,
        text: &str,
    ) -> Result<String, StepError> {
        let request = serde_json::json!({
            "model": self.analysis_model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": ANALYSIS_PROMPT},
                {"role": "user", "content": text},
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&credentials.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StepError::from_request("analysis", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StepError::from_request("analysis", e))?;
        if !status.is_success() {
            return Err(StepError::from_status("analysis", status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| StepError::transient(format!("unreadable analysis response: {e}")))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl PluginAdapter for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Speech
    }

    fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        if self.is_enabled() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(UNAVAILABLE.into()))
        }
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        Ok(())
    }
}

#[async_trait]
impl SpeechAdapter for OpenAiSpeech {
    async fn transcribe(&self, audio_url: &str, recording_id: &str) -> TranscriptionResult {
        let outcome = match &self.credentials {
            None => TranscriptionOutcome::TranscriptionFailed {
                reason: UNAVAILABLE.into(),
                retryable: false,
            },
            Some(credentials) => match self.request_transcription(credentials, audio_url).await {
                Ok(text) => {
                    debug!(recording_id, chars = text.len(), "transcription complete");
                    TranscriptionOutcome::Transcribed { text }
                }
                Err(e) => {
                    warn!(recording_id, reason = %e.reason, retryable = e.retryable, "transcription failed");
                    TranscriptionOutcome::TranscriptionFailed {
                        reason: e.reason,
                        retryable: e.retryable,
                    }
                }
            },
        };

        TranscriptionResult {
            recording_id: recording_id.to_string(),
            processed_at: timestamp(),
            outcome,
        }
    }

    async fn analyze(&self, text: &str, recording_id: &str) -> AnalysisResult {
        let outcome = match &self.credentials {
            None => AnalysisOutcome::AnalysisFailed {
                reason: UNAVAILABLE.into(),
                retryable: false,
            },
            Some(credentials) => match self.request_analysis(credentials, text).await {
                Ok(content) => match parse_intent_response(&content) {
                    Some(intent) => AnalysisOutcome::Analyzed { intent },
                    None => {
                        debug!(recording_id, "analysis response not JSON, using fallback parser");
                        AnalysisOutcome::AnalyzedByFallback {
                            intent: analyze_fallback(text),
                        }
                    }
                },
                Err(e) => {
                    warn!(recording_id, reason = %e.reason, retryable = e.retryable, "analysis failed");
                    AnalysisOutcome::AnalysisFailed {
                        reason: e.reason,
                        retryable: e.retryable,
                    }
                }
            },
        };

        AnalysisResult {
            recording_id: recording_id.to_string(),
            processed_at: timestamp(),
            outcome,
        }
    }
}
