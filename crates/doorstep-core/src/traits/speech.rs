// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech and intent adapter trait.

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{AnalysisResult, TranscriptionResult};

/// Transcription and intent extraction. Neither operation returns an error:
/// failures are carried in the result's outcome.
#[async_trait]
pub trait SpeechAdapter: PluginAdapter {
    async fn transcribe(&self, audio_url: &str, recording_id: &str) -> TranscriptionResult;

    async fn analyze(&self, text: &str, recording_id: &str) -> AnalysisResult;
}
