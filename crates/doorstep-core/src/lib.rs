// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Doorstep delivery-call pipeline.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Doorstep workspace. All adapters and the
//! pipeline coordinator are written against the traits defined here.

pub mod error;
pub mod jobs;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DoorstepError;
pub use jobs::{
    EnqueueOptions, FailOutcome, FailureDisposition, InitiateCallPayload, Job, JobKind,
    JobPayload, JobStatus, ProcessRecordingPayload, ProcessTranscriptionPayload, QueueStats,
};
pub use types::{
    AdapterType, Agent, AnalysisOutcome, AnalysisResult, CallLog, CallRequest, CallStatus,
    CallSync, Customer, Delivery, DeliveryStatus, HealthStatus, Intent, NewRecording,
    Notification, NotificationKind, PersistedAudio, PlacedCall, Priority, Recording,
    RecordingInsert, RecordingLeg, Sentiment, TranscriptionOutcome, TranscriptionResult,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    DataPlane, JobQueue, MediaStore, PluginAdapter, ResultCache, SpeechAdapter, StorageAdapter,
    TelephonyAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Storage,
            AdapterType::Queue,
            AdapterType::Telephony,
            AdapterType::MediaStore,
            AdapterType::Speech,
            AdapterType::Cache,
            AdapterType::Push,
            AdapterType::Observability,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        assert_ne!(HealthStatus::Degraded("disabled".into()), healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), healthy);
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _dyn_storage(_: &dyn StorageAdapter) {}
        fn _dyn_data_plane(_: &dyn DataPlane) {}
        fn _dyn_queue(_: &dyn JobQueue) {}
        fn _dyn_telephony(_: &dyn TelephonyAdapter) {}
        fn _dyn_media(_: &dyn MediaStore) {}
        fn _dyn_speech(_: &dyn SpeechAdapter) {}
        fn _dyn_cache(_: &dyn ResultCache) {}
    }
}
