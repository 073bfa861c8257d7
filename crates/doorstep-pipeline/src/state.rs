// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline state derived from persisted rows.

use std::time::Duration;

use doorstep_core::{CallLog, CallStatus, Recording};
use serde::Serialize;
use strum::Display;

/// Where a delivery's latest call attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Idle,
    CallPlaced,
    CallLive,
    RecordingReady,
    AudioPersisted,
    Transcribed,
    Analyzed,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Derives the state of the latest call attempt.
///
/// A leg that ended without a recording still awaits one for `grace` after
/// its last update; past the window it is failed. A provider-failed leg can
/// never carry a recording and fails immediately.
pub fn derive_state(
    latest: Option<&CallLog>,
    recording: Option<&Recording>,
    now_ms: i64,
    grace: Duration,
) -> PipelineState {
    let Some(call) = latest else {
        return PipelineState::Idle;
    };

    if let Some(recording) = recording {
        return if recording.notified_at.is_some() {
            PipelineState::Done
        } else if recording.intent.is_some() {
            PipelineState::Analyzed
        } else if recording.transcript.is_some() {
            PipelineState::Transcribed
        } else {
            PipelineState::AudioPersisted
        };
    }

    if call.recording_url.is_some() {
        return PipelineState::RecordingReady;
    }

    match call.status {
        CallStatus::Queued | CallStatus::Initiated => PipelineState::CallPlaced,
        CallStatus::Ringing | CallStatus::Answered => PipelineState::CallLive,
        CallStatus::Failed => PipelineState::Failed,
        CallStatus::Completed | CallStatus::NoAnswer | CallStatus::Busy => {
            if within_grace(&call.updated_at, now_ms, grace) {
                PipelineState::CallLive
            } else {
                PipelineState::Failed
            }
        }
    }
}

fn within_grace(updated_at: &str, now_ms: i64, grace: Duration) -> bool {
    let Ok(updated) = chrono::DateTime::parse_from_rfc3339(updated_at) else {
        return false;
    };
    let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(updated.timestamp_millis()) < grace_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorstep_core::Intent;

    const T0: &str = "2026-03-01T12:00:00.000Z";
    const T0_MS: i64 = 1_772_366_400_000;

    fn call(status: CallStatus) -> CallLog {
        CallLog {
            id: "L1".into(),
            delivery_id: "D1".into(),
            call_sid: Some("CA1".into()),
            status,
            duration_secs: 0,
            recording_url: None,
            created_at: T0.into(),
            updated_at: T0.into(),
        }
    }

    fn recording() -> Recording {
        Recording {
            id: "R1".into(),
            call_log_id: "L1".into(),
            audio_url: "https://cdn/r.wav".into(),
            audio_durable: true,
            duration_secs: 30,
            transcript: None,
            intent: None,
            notified_at: None,
            created_at: T0.into(),
            updated_at: T0.into(),
        }
    }

    const GRACE: Duration = Duration::from_secs(120);

    #[test]
    fn no_call_is_idle() {
        assert_eq!(derive_state(None, None, T0_MS, GRACE), PipelineState::Idle);
    }

    #[test]
    fn call_progression() {
        let placed = call(CallStatus::Initiated);
        assert_eq!(derive_state(Some(&placed), None, T0_MS, GRACE), PipelineState::CallPlaced);
        let live = call(CallStatus::Answered);
        assert_eq!(derive_state(Some(&live), None, T0_MS, GRACE), PipelineState::CallLive);
        let mut ready = call(CallStatus::Completed);
        ready.recording_url = Some("u".into());
        assert_eq!(
            derive_state(Some(&ready), None, T0_MS, GRACE),
            PipelineState::RecordingReady
        );
    }

    #[test]
    fn recording_progression() {
        let c = call(CallStatus::Completed);
        let mut r = recording();
        assert_eq!(derive_state(Some(&c), Some(&r), T0_MS, GRACE), PipelineState::AudioPersisted);
        r.transcript = Some("hello".into());
        assert_eq!(derive_state(Some(&c), Some(&r), T0_MS, GRACE), PipelineState::Transcribed);
        r.intent = Some(Intent::default());
        assert_eq!(derive_state(Some(&c), Some(&r), T0_MS, GRACE), PipelineState::Analyzed);
        r.notified_at = Some(T0.into());
        assert_eq!(derive_state(Some(&c), Some(&r), T0_MS, GRACE), PipelineState::Done);
    }

    #[test]
    fn no_answer_waits_out_the_grace_window() {
        let c = call(CallStatus::NoAnswer);
        assert_eq!(
            derive_state(Some(&c), None, T0_MS + 60_000, GRACE),
            PipelineState::CallLive
        );
        assert_eq!(
            derive_state(Some(&c), None, T0_MS + 120_000, GRACE),
            PipelineState::Failed
        );
    }

    #[test]
    fn provider_failure_is_immediately_failed() {
        let c = call(CallStatus::Failed);
        assert_eq!(derive_state(Some(&c), None, T0_MS, GRACE), PipelineState::Failed);
    }

    #[test]
    fn state_names() {
        assert_eq!(PipelineState::AudioPersisted.to_string(), "AUDIO_PERSISTED");
        assert_eq!(
            serde_json::to_value(PipelineState::CallLive).unwrap(),
            "CALL_LIVE"
        );
        assert!(PipelineState::Done.is_terminal());
        assert!(!PipelineState::Analyzed.is_terminal());
    }
}
