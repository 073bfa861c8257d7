// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline job records and their typed payloads.
//!
//! The queue stores payloads as opaque JSON text; the job kind determines
//! the payload shape. A payload that does not decode for its kind is a
//! permanent failure and is never retried.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::DoorstepError;

/// Kind of pipeline task. Each kind is a separate FIFO lane in the queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    InitiateCall,
    ProcessRecording,
    ProcessTranscription,
}

/// Disposition of a job row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    /// Failed permanently; never retried.
    Failed,
}

/// A queued unit of pipeline work as stored by the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub kind: JobKind,
    /// Raw JSON payload; decode with [`JobPayload::decode`].
    pub payload: String,
    pub status: JobStatus,
    /// Failed executions so far.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Lease expiries recovered so far.
    pub stall_count: u32,
    /// Earliest visibility time (epoch milliseconds).
    pub run_at_ms: i64,
    /// Lease expiry while active (epoch milliseconds).
    pub locked_until_ms: Option<i64>,
    pub last_error: Option<String>,
    pub dedupe_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Whether a failure of the current execution exhausts the retry budget.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}

/// Options accepted by [`JobQueue::enqueue`](crate::JobQueue::enqueue).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueOptions {
    /// Minimum delay before the job becomes visible.
    pub delay: Duration,
    /// Override for the queue-wide attempt budget.
    pub max_attempts: Option<u32>,
    /// While a pending or active job carries this key, enqueueing the same
    /// key returns the existing job id.
    pub dedupe_key: Option<String>,
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn deduped(key: impl Into<String>) -> Self {
        Self {
            dedupe_key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// How a failed execution should be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Schedule another attempt if the budget allows.
    Retry,
    /// Mark failed-permanent immediately.
    Permanent,
}

/// Result of [`JobQueue::fail`](crate::JobQueue::fail).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { attempt: u32, run_at_ms: i64 },
    FailedPermanent,
}

/// Queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Place an outbound call for a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitiateCallPayload {
    pub delivery_id: String,
}

/// Persist, transcribe and analyze a completed recording leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessRecordingPayload {
    pub delivery_id: String,
    pub call_sid: String,
    pub recording_url: String,
    #[serde(default)]
    pub recording_sid: Option<String>,
    pub duration_secs: u32,
    /// Manual re-entry at AUDIO_PERSISTED; bypasses cached results.
    #[serde(default)]
    pub reprocess: bool,
}

/// Provider-side transcript delivered by webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessTranscriptionPayload {
    pub delivery_id: String,
    pub call_sid: String,
    pub text: String,
}

/// Typed payload, one variant per [`JobKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    InitiateCall(InitiateCallPayload),
    ProcessRecording(ProcessRecordingPayload),
    ProcessTranscription(ProcessTranscriptionPayload),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::InitiateCall(_) => JobKind::InitiateCall,
            Self::ProcessRecording(_) => JobKind::ProcessRecording,
            Self::ProcessTranscription(_) => JobKind::ProcessTranscription,
        }
    }

    /// Serializes the payload body (without the kind, which is stored alongside).
    pub fn encode(&self) -> Result<String, DoorstepError> {
        let encoded = match self {
            Self::InitiateCall(p) => serde_json::to_string(p),
            Self::ProcessRecording(p) => serde_json::to_string(p),
            Self::ProcessTranscription(p) => serde_json::to_string(p),
        };
        encoded.map_err(|e| DoorstepError::InvalidPayload(e.to_string()))
    }

    /// Decodes a stored payload for its kind, validating required fields.
    pub fn decode(kind: JobKind, raw: &str) -> Result<Self, DoorstepError> {
        let invalid = |e: serde_json::Error| DoorstepError::InvalidPayload(format!("{kind}: {e}"));
        let payload = match kind {
            JobKind::InitiateCall => Self::InitiateCall(serde_json::from_str(raw).map_err(invalid)?),
            JobKind::ProcessRecording => {
                Self::ProcessRecording(serde_json::from_str(raw).map_err(invalid)?)
            }
            JobKind::ProcessTranscription => {
                Self::ProcessTranscription(serde_json::from_str(raw).map_err(invalid)?)
            }
        };
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), DoorstepError> {
        let missing = |field: &str| {
            Err(DoorstepError::InvalidPayload(format!(
                "{}: `{field}` must not be empty",
                self.kind()
            )))
        };
        match self {
            Self::InitiateCall(p) if p.delivery_id.trim().is_empty() => missing("delivery_id"),
            Self::ProcessRecording(p) if p.delivery_id.trim().is_empty() => missing("delivery_id"),
            Self::ProcessRecording(p) if p.call_sid.trim().is_empty() => missing("call_sid"),
            Self::ProcessRecording(p) if p.recording_url.trim().is_empty() => {
                missing("recording_url")
            }
            Self::ProcessRecording(p) if p.duration_secs == 0 => missing("duration_secs"),
            Self::ProcessTranscription(p) if p.delivery_id.trim().is_empty() => {
                missing("delivery_id")
            }
            Self::ProcessTranscription(p) if p.call_sid.trim().is_empty() => missing("call_sid"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_kebab_case() {
        assert_eq!(JobKind::InitiateCall.to_string(), "initiate-call");
        assert_eq!(JobKind::ProcessRecording.to_string(), "process-recording");
        assert_eq!(
            "process-transcription".parse::<JobKind>().unwrap(),
            JobKind::ProcessTranscription
        );
    }

    #[test]
    fn decode_checks_shape_against_kind() {
        let raw = r#"{"delivery_id":"D1"}"#;
        assert!(JobPayload::decode(JobKind::InitiateCall, raw).is_ok());
        let err = JobPayload::decode(JobKind::ProcessRecording, raw).unwrap_err();
        assert!(matches!(err, DoorstepError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(JobPayload::decode(JobKind::InitiateCall, "not json").is_err());
        assert!(JobPayload::decode(JobKind::InitiateCall, r#"{"delivery_id":" "}"#).is_err());
    }

    #[test]
    fn decode_rejects_zero_length_recording() {
        let raw = r#"{"delivery_id":"D1","call_sid":"CA1","recording_url":"u","duration_secs":0}"#;
        assert!(JobPayload::decode(JobKind::ProcessRecording, raw).is_err());
    }

    #[test]
    fn encode_then_decode_preserves_recording_payload() {
        let payload = JobPayload::ProcessRecording(ProcessRecordingPayload {
            delivery_id: "D1".into(),
            call_sid: "CA1".into(),
            recording_url: "https://api.example.com/RE1".into(),
            recording_sid: Some("RE1".into()),
            duration_secs: 60,
            reprocess: false,
        });
        let raw = payload.encode().unwrap();
        assert_eq!(JobPayload::decode(JobKind::ProcessRecording, &raw).unwrap(), payload);
    }

    #[test]
    fn final_attempt_accounting() {
        let mut job = Job {
            id: 1,
            kind: JobKind::InitiateCall,
            payload: "{}".into(),
            status: JobStatus::Active,
            attempts: 0,
            max_attempts: 3,
            stall_count: 0,
            run_at_ms: 0,
            locked_until_ms: None,
            last_error: None,
            dedupe_key: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!job.is_final_attempt());
        job.attempts = 2;
        assert!(job.is_final_attempt());
        job.max_attempts = 1;
        job.attempts = 0;
        assert!(job.is_final_attempt());
    }
}
