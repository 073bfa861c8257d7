// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordinator and worker behaviour against real SQLite and mock providers.

use std::time::Duration;

use doorstep_core::{
    CallStatus, DataPlane, DeliveryStatus, JobKind, JobQueue, JobStatus, Priority,
    TranscriptionOutcome,
};
use doorstep_pipeline::{PipelineState, RunOutcome};
use doorstep_test_utils::{
    AnalysisMode, MockFailure, MockMediaStore, MockSpeech, MockTelephony, TestHarness,
};
use tokio_util::sync::CancellationToken;

const RECORDING_URL: &str = "https://provider.test/Recordings/RE1";

async fn seeded(harness: TestHarness) -> TestHarness {
    harness.seed_agent("A1").await.unwrap();
    harness.seed_delivery("D1", Some("A1")).await.unwrap();
    harness
}

async fn placed(harness: &TestHarness) {
    harness
        .coordinator
        .request_call("D1", Duration::ZERO)
        .await
        .unwrap();
    harness.drain().await.unwrap();
}

async fn recording_webhook(harness: &TestHarness, call_sid: &str, duration: &str) {
    let (status, _) = harness
        .post_webhook(
            "/webhooks/recording?delivery_id=D1",
            &[
                ("CallSid", call_sid),
                ("RecordingUrl", RECORDING_URL),
                ("RecordingDuration", duration),
            ],
        )
        .await;
    assert!(status.is_success());
}

#[tokio::test]
async fn placement_marks_delivery_in_progress() {
    let harness = seeded(TestHarness::new().await.unwrap()).await;
    placed(&harness).await;

    let placed_calls = harness.telephony.placed_calls();
    assert_eq!(placed_calls.len(), 1);
    assert_eq!(placed_calls[0].to, "+15550001111");
    assert_eq!(placed_calls[0].callback_base, "https://hooks.test");

    let delivery = harness.storage.get_delivery("D1").await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::InProgress);
    assert_eq!(
        harness.coordinator.pipeline_state("D1").await.unwrap(),
        PipelineState::CallPlaced
    );
}

#[tokio::test]
async fn transient_placement_failure_is_retried() {
    let telephony = MockTelephony::new();
    telephony.fail_next_call(MockFailure::Transient);
    let harness = seeded(
        TestHarness::builder()
            .with_telephony(telephony)
            .build()
            .await
            .unwrap(),
    )
    .await;

    harness
        .coordinator
        .request_call("D1", Duration::ZERO)
        .await
        .unwrap();
    let runs = harness.drain().await.unwrap();
    assert_eq!(runs[0].outcome, RunOutcome::Retrying { attempt: 1 });
    assert_eq!(runs.last().unwrap().outcome, RunOutcome::Completed);

    let calls = harness.storage.list_calls("D1").await.unwrap();
    assert_eq!(calls.len(), 1, "the retry reuses the reserved slot");
    assert_eq!(calls[0].call_sid.as_deref(), Some("CA1"));
}

#[tokio::test]
async fn rejected_placement_fails_permanently_and_frees_the_slot() {
    let telephony = MockTelephony::new();
    telephony.fail_next_call(MockFailure::Permanent);
    let harness = seeded(
        TestHarness::builder()
            .with_telephony(telephony)
            .build()
            .await
            .unwrap(),
    )
    .await;

    placed(&harness).await;
    let stats = harness.storage.stats(Some(JobKind::InitiateCall)).await.unwrap();
    assert_eq!(stats.failed, 1);
    assert!(harness.storage.active_call("D1").await.unwrap().is_none());
    assert_eq!(
        harness.coordinator.pipeline_state("D1").await.unwrap(),
        PipelineState::Failed
    );

    // A fresh request can place a new call.
    placed(&harness).await;
    assert_eq!(harness.telephony.placed_calls().len(), 1);
}

#[tokio::test]
async fn media_outage_on_final_attempt_keeps_provider_url() {
    let media = MockMediaStore::new();
    for _ in 0..3 {
        media.fail_next(MockFailure::Transient);
    }
    let harness = seeded(
        TestHarness::builder()
            .with_media(media)
            .build()
            .await
            .unwrap(),
    )
    .await;
    placed(&harness).await;
    recording_webhook(&harness, "CA1", "30").await;
    let runs = harness.drain().await.unwrap();
    assert_eq!(runs.last().unwrap().outcome, RunOutcome::Completed);

    let call = harness.storage.get_call_by_sid("CA1").await.unwrap().unwrap();
    let recording = harness
        .storage
        .get_recording_for_call(&call.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recording.audio_url, RECORDING_URL);
    assert!(!recording.audio_durable);
    assert!(recording.transcript.is_some(), "degraded audio still transcribes");
    assert_eq!(harness.push.sent().len(), 1);
}

#[tokio::test]
async fn exhausted_analysis_falls_back_to_keywords() {
    let speech = MockSpeech::new("leave it at the front door, urgent");
    speech.set_analysis(AnalysisMode::Fail { retryable: true });
    let harness = seeded(
        TestHarness::builder()
            .with_speech(speech)
            .build()
            .await
            .unwrap(),
    )
    .await;
    placed(&harness).await;
    recording_webhook(&harness, "CA1", "20").await;
    harness.drain().await.unwrap();

    assert_eq!(harness.speech.analyze_calls(), 3);
    let call = harness.storage.get_call_by_sid("CA1").await.unwrap().unwrap();
    let recording = harness
        .storage
        .get_recording_for_call(&call.id)
        .await
        .unwrap()
        .unwrap();
    let intent = recording.intent.unwrap();
    assert_eq!(intent.priority, Priority::Urgent);
    assert_eq!(intent.conditions, vec!["leave at door".to_string()]);
}

#[tokio::test]
async fn transcription_failure_still_notifies() {
    let speech = MockSpeech::new("unused");
    speech.script_transcription(TranscriptionOutcome::TranscriptionFailed {
        reason: "audio unreadable".into(),
        retryable: false,
    });
    let harness = seeded(
        TestHarness::builder()
            .with_speech(speech)
            .build()
            .await
            .unwrap(),
    )
    .await;
    placed(&harness).await;
    recording_webhook(&harness, "CA1", "20").await;
    harness.drain().await.unwrap();

    let sent = harness.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        harness.coordinator.pipeline_state("D1").await.unwrap(),
        PipelineState::Done
    );
}

#[tokio::test]
async fn provider_transcript_before_recording_waits_for_it() {
    let harness = seeded(
        TestHarness::builder()
            .with_speech(MockSpeech::disabled())
            .build()
            .await
            .unwrap(),
    )
    .await;
    placed(&harness).await;

    let (status, _) = harness
        .post_webhook(
            "/webhooks/transcription?delivery_id=D1",
            &[("CallSid", "CA1"), ("TranscriptionText", "no signature needed")],
        )
        .await;
    assert!(status.is_success());
    let run = harness
        .workers
        .run_next(JobKind::ProcessTranscription)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.outcome, RunOutcome::Retrying { attempt: 1 });

    recording_webhook(&harness, "CA1", "15").await;
    harness.drain().await.unwrap();

    let call = harness.storage.get_call_by_sid("CA1").await.unwrap().unwrap();
    let recording = harness
        .storage
        .get_recording_for_call(&call.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recording.transcript.as_deref(), Some("no signature needed"));
    assert_eq!(
        recording.intent.unwrap().conditions,
        vec!["no signature".to_string()]
    );
    assert_eq!(harness.push.sent().len(), 1, "one fanout per recording");
}

#[tokio::test]
async fn reprocess_fills_missing_transcript_and_keeps_audio() {
    let speech = MockSpeech::new("please leave at the door");
    speech.script_transcription(TranscriptionOutcome::TranscriptionFailed {
        reason: "unsupported codec".into(),
        retryable: false,
    });
    let harness = seeded(
        TestHarness::builder()
            .with_speech(speech)
            .build()
            .await
            .unwrap(),
    )
    .await;
    placed(&harness).await;
    recording_webhook(&harness, "CA1", "25").await;
    harness.drain().await.unwrap();

    let call = harness.storage.get_call_by_sid("CA1").await.unwrap().unwrap();
    let before = harness
        .storage
        .get_recording_for_call(&call.id)
        .await
        .unwrap()
        .unwrap();
    assert!(before.transcript.is_none());

    harness.coordinator.reprocess(&before.id).await.unwrap();
    harness.drain().await.unwrap();

    let after = harness.storage.get_recording(&before.id).await.unwrap().unwrap();
    assert_eq!(after.audio_url, before.audio_url);
    assert_eq!(after.transcript.as_deref(), Some("please leave at the door"));
    assert!(after.intent.is_some());
    assert_eq!(harness.push.sent().len(), 1, "reprocess does not re-notify");
}

#[tokio::test]
async fn unreachable_customer_notifies_once() {
    let harness = seeded(TestHarness::new().await.unwrap()).await;
    placed(&harness).await;

    for _ in 0..2 {
        let sync = harness
            .coordinator
            .record_call_status(None, "CA1", CallStatus::Busy, Some(0))
            .await
            .unwrap();
        assert_eq!(sync.call.status, CallStatus::Busy);
    }
    let sent = harness.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload["kind"], "status-update");
    assert_eq!(harness.telephony.sent_sms().len(), 1);
}

#[tokio::test]
async fn ended_call_waits_for_recording_within_grace() {
    let harness = seeded(
        TestHarness::builder()
            .with_recording_grace(Duration::from_secs(3600))
            .build()
            .await
            .unwrap(),
    )
    .await;
    placed(&harness).await;
    harness
        .coordinator
        .record_call_status(None, "CA1", CallStatus::Completed, Some(31))
        .await
        .unwrap();
    assert_eq!(
        harness.coordinator.pipeline_state("D1").await.unwrap(),
        PipelineState::CallLive
    );
}

#[tokio::test]
async fn stalled_job_is_requeued_then_failed() {
    let harness = seeded(TestHarness::new().await.unwrap()).await;
    let job_id = harness
        .coordinator
        .request_call("D1", Duration::ZERO)
        .await
        .unwrap();

    for expected in [JobStatus::Pending, JobStatus::Failed] {
        let leased = harness
            .storage
            .reserve(JobKind::InitiateCall, Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, job_id);
        tokio::time::sleep(Duration::from_millis(5)).await;
        harness.workers.sweep().await;
        let job = harness.storage.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, expected);
    }
}

#[tokio::test]
async fn workers_stop_on_cancel() {
    let harness = seeded(TestHarness::new().await.unwrap()).await;
    let cancel = CancellationToken::new();
    let pool = harness.workers.clone();
    let handle = tokio::spawn(pool.run(cancel.clone()));

    harness
        .coordinator
        .request_call("D1", Duration::ZERO)
        .await
        .unwrap();
    for _ in 0..200 {
        if !harness.telephony.placed_calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.telephony.placed_calls().len(), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("workers stop promptly")
        .unwrap();
}
