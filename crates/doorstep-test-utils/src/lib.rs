// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Doorstep integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockTelephony`] - Call placement, SMS capture and real webhook signatures
//! - [`MockMediaStore`] - Object store with failure injection
//! - [`MockSpeech`] - Scripted transcription and analysis
//! - [`MockPushSender`] - Captures web-push sends
//! - [`TestHarness`] - Real SQLite storage and coordinator wired to the mocks

pub mod harness;
pub mod mock_media;
pub mod mock_push;
pub mod mock_speech;
pub mod mock_telephony;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_media::MockMediaStore;
pub use mock_push::MockPushSender;
pub use mock_speech::{AnalysisMode, MockSpeech};
pub use mock_telephony::MockTelephony;

/// Failure injected into a mock adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Provider 5xx or timeout.
    Transient,
    /// Provider 4xx.
    Permanent,
}

impl MockFailure {
    pub(crate) fn into_error(self, provider: &'static str) -> doorstep_core::DoorstepError {
        match self {
            Self::Transient => doorstep_core::DoorstepError::transient(provider, "injected outage"),
            Self::Permanent => doorstep_core::DoorstepError::permanent(provider, "injected rejection"),
        }
    }
}
