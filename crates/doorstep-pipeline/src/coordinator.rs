// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-delivery pipeline state machine.
//!
//! Steps are idempotent advances over data-plane rows: call placement
//! reserves the delivery's single active slot, the recording leg is keyed by
//! the provider call id, derived recording fields are write-once, and the
//! agent fanout is claimed exactly once per recording.

use std::sync::Arc;
use std::time::{Duration, Instant};

use doorstep_config::DoorstepConfig;
use doorstep_core::types::epoch_ms;
use doorstep_core::{
    Agent, AnalysisOutcome, CallLog, CallRequest, CallStatus, CallSync, DataPlane, Delivery,
    DeliveryStatus, DoorstepError, EnqueueOptions, InitiateCallPayload, Intent, Job, JobPayload,
    JobQueue, MediaStore, NewRecording, Notification, NotificationKind, PersistedAudio, Priority,
    ProcessRecordingPayload, ProcessTranscriptionPayload, Recording, TelephonyAdapter,
    TranscriptionOutcome,
};
use doorstep_notify::{FanoutReport, Notifier};
use doorstep_prometheus::{record_call_placed, record_step_latency};
use doorstep_speech::{CachedSpeech, analyze_fallback};
use tracing::{debug, info, warn};

use crate::state::{PipelineState, derive_state};

/// Deployment settings the coordinator needs beyond its adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Public base URL the telephony provider calls back into.
    pub callback_base: String,
    /// How long an ended call without a recording still awaits one.
    pub recording_grace: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &DoorstepConfig) -> Self {
        Self {
            callback_base: config.server.public_base_url.clone(),
            recording_grace: Duration::from_secs(config.pipeline.recording_grace_secs),
        }
    }
}

/// Drives deliveries through the call pipeline.
pub struct Coordinator {
    data: Arc<dyn DataPlane>,
    queue: Arc<dyn JobQueue>,
    telephony: Arc<dyn TelephonyAdapter>,
    media: Arc<dyn MediaStore>,
    speech: CachedSpeech,
    notifier: Arc<Notifier>,
    settings: PipelineSettings,
}

impl Coordinator {
    pub fn new(
        data: Arc<dyn DataPlane>,
        queue: Arc<dyn JobQueue>,
        telephony: Arc<dyn TelephonyAdapter>,
        media: Arc<dyn MediaStore>,
        speech: CachedSpeech,
        notifier: Arc<Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            data,
            queue,
            telephony,
            media,
            speech,
            notifier,
            settings,
        }
    }

    pub fn data(&self) -> &Arc<dyn DataPlane> {
        &self.data
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn telephony(&self) -> &Arc<dyn TelephonyAdapter> {
        &self.telephony
    }

    pub fn media(&self) -> &Arc<dyn MediaStore> {
        &self.media
    }

    pub fn speech(&self) -> &CachedSpeech {
        &self.speech
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    // --- Entry points used by the control API and webhooks ---

    /// Queues call placement for a delivery.
    ///
    /// Fails with `NotFound` for an unknown delivery, `Conflict` when the
    /// delivery already has a live call or is closed, and `Disabled` when no
    /// telephony provider is configured.
    pub async fn request_call(&self, delivery_id: &str, delay: Duration) -> Result<i64, DoorstepError> {
        let delivery = self.require_delivery(delivery_id).await?;
        if matches!(
            delivery.status,
            DeliveryStatus::Completed | DeliveryStatus::Failed
        ) {
            return Err(DoorstepError::Conflict(format!(
                "delivery {delivery_id} is already {}",
                delivery.status
            )));
        }
        if let Some(active) = self.data.active_call(delivery_id).await? {
            return Err(DoorstepError::Conflict(format!(
                "delivery {delivery_id} already has an active call ({})",
                active.status
            )));
        }
        if !self.telephony.is_enabled() {
            return Err(DoorstepError::Disabled {
                adapter: "telephony",
            });
        }

        let payload = JobPayload::InitiateCall(InitiateCallPayload {
            delivery_id: delivery_id.to_string(),
        });
        let options = EnqueueOptions {
            delay,
            dedupe_key: Some(format!("initiate:{delivery_id}")),
            ..EnqueueOptions::default()
        };
        let job_id = self.queue.enqueue(&payload, options).await?;
        info!(delivery_id, job_id, delay_secs = delay.as_secs(), "call requested");
        Ok(job_id)
    }

    /// Applies a provider call-status report.
    ///
    /// The CallLog is found by call id, or bound/created for `delivery_id`
    /// when the report is the first we hear of the leg. The first transition
    /// into an unreachable status notifies the agent.
    pub async fn record_call_status(
        &self,
        delivery_id: Option<&str>,
        call_sid: &str,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<CallSync, DoorstepError> {
        let call = match self.data.get_call_by_sid(call_sid).await? {
            Some(call) => call,
            None => match delivery_id {
                Some(delivery_id) => {
                    self.require_delivery(delivery_id).await?;
                    self.data.ensure_call(delivery_id, call_sid).await?
                }
                None => {
                    return Err(DoorstepError::NotFound {
                        entity: "call",
                        id: call_sid.to_string(),
                    });
                }
            },
        };

        let sync = self
            .data
            .apply_call_status(&call.id, status, duration_secs)
            .await?;
        if sync.transitioned {
            debug!(
                call_sid,
                from = %sync.previous,
                to = %sync.call.status,
                "call status advanced"
            );
        }

        if sync.became_unreachable() {
            info!(
                delivery_id = %sync.call.delivery_id,
                call_sid,
                status = %sync.call.status,
                "customer unreachable"
            );
            self.notify_unreachable(&sync.call).await?;
        }
        Ok(sync)
    }

    /// Re-enters the pipeline at AUDIO_PERSISTED for an existing recording.
    ///
    /// Cached transcription and analysis results are dropped first. The
    /// audio URL is reused as-is; only missing derived fields get filled.
    pub async fn reprocess(&self, recording_id: &str) -> Result<i64, DoorstepError> {
        let recording = self
            .data
            .get_recording(recording_id)
            .await?
            .ok_or_else(|| DoorstepError::NotFound {
                entity: "recording",
                id: recording_id.to_string(),
            })?;
        let call = self
            .data
            .get_call(&recording.call_log_id)
            .await?
            .ok_or_else(|| DoorstepError::NotFound {
                entity: "call log",
                id: recording.call_log_id.clone(),
            })?;
        let call_sid = call.call_sid.clone().ok_or_else(|| {
            DoorstepError::Conflict(format!("call log {} has no provider call id", call.id))
        })?;

        self.speech.invalidate(&recording.id).await;

        let payload = JobPayload::ProcessRecording(ProcessRecordingPayload {
            delivery_id: call.delivery_id.clone(),
            call_sid,
            recording_url: recording.audio_url.clone(),
            recording_sid: None,
            duration_secs: recording.duration_secs.max(1),
            reprocess: true,
        });
        let job_id = self
            .queue
            .enqueue(
                &payload,
                EnqueueOptions::deduped(format!("reprocess:{recording_id}")),
            )
            .await?;
        info!(recording_id, job_id, "recording queued for reprocessing");
        Ok(job_id)
    }

    /// Derives the pipeline state of the delivery's latest call attempt.
    pub async fn pipeline_state(&self, delivery_id: &str) -> Result<PipelineState, DoorstepError> {
        self.require_delivery(delivery_id).await?;
        let calls = self.data.list_calls(delivery_id).await?;
        let latest = calls.last();
        let recording = match latest {
            Some(call) => self.data.get_recording_for_call(&call.id).await?,
            None => None,
        };
        Ok(derive_state(
            latest,
            recording.as_ref(),
            epoch_ms(),
            self.settings.recording_grace,
        ))
    }

    // --- Job execution ---

    /// Runs one leased job. The error's retryability decides between a queue
    /// retry and a permanent failure.
    pub async fn handle(&self, job: &Job) -> Result<(), DoorstepError> {
        let payload = JobPayload::decode(job.kind, &job.payload)?;
        let final_attempt = job.is_final_attempt();
        match payload {
            JobPayload::InitiateCall(p) => self.initiate_call(&p, final_attempt).await,
            JobPayload::ProcessRecording(p) => self.process_recording(&p, final_attempt).await,
            JobPayload::ProcessTranscription(p) => {
                self.process_transcription(&p, final_attempt).await
            }
        }
    }

    async fn initiate_call(
        &self,
        payload: &InitiateCallPayload,
        final_attempt: bool,
    ) -> Result<(), DoorstepError> {
        let started = Instant::now();
        let delivery = self.require_delivery(&payload.delivery_id).await?;
        if matches!(
            delivery.status,
            DeliveryStatus::Completed | DeliveryStatus::Failed
        ) {
            info!(delivery_id = %delivery.id, status = %delivery.status, "delivery closed, not calling");
            return Ok(());
        }
        let customer = self
            .data
            .get_customer(&delivery.customer_id)
            .await?
            .ok_or_else(|| DoorstepError::NotFound {
                entity: "customer",
                id: delivery.customer_id.clone(),
            })?;

        let slot = match self.data.reserve_call_slot(&delivery.id).await? {
            Some(slot) => slot,
            None => match self.data.active_call(&delivery.id).await? {
                // An earlier attempt reserved the slot but never got a call id.
                Some(active) if active.call_sid.is_none() => active,
                Some(active) => {
                    info!(
                        delivery_id = %delivery.id,
                        call_sid = active.call_sid.as_deref().unwrap_or_default(),
                        "delivery already has a live call"
                    );
                    return Ok(());
                }
                None => {
                    return Err(DoorstepError::transient(
                        "pipeline",
                        "active call slot released concurrently",
                    ));
                }
            },
        };

        let request = CallRequest {
            delivery_id: delivery.id.clone(),
            to: customer.phone.clone(),
            callback_base: self.settings.callback_base.clone(),
        };
        match self.telephony.place_call(&request).await {
            Ok(placed) => {
                let call = self
                    .data
                    .attach_call_sid(&slot.id, &placed.call_sid, placed.status)
                    .await?;
                self.data
                    .set_delivery_status(&delivery.id, DeliveryStatus::InProgress)
                    .await?;
                record_call_placed();
                record_step_latency("initiate_call", started.elapsed().as_secs_f64());
                info!(
                    delivery_id = %delivery.id,
                    call_sid = %placed.call_sid,
                    status = %call.status,
                    "call placed"
                );
                Ok(())
            }
            Err(e) => {
                if !e.is_retryable() || final_attempt {
                    // Free the slot so a later request can place a fresh call.
                    self.data
                        .apply_call_status(&slot.id, CallStatus::Failed, None)
                        .await?;
                }
                Err(e)
            }
        }
    }

    async fn process_recording(
        &self,
        payload: &ProcessRecordingPayload,
        final_attempt: bool,
    ) -> Result<(), DoorstepError> {
        let leg = self
            .data
            .attach_recording_leg(
                &payload.delivery_id,
                &payload.call_sid,
                &payload.recording_url,
                payload.duration_secs,
            )
            .await?;
        if leg.synthesized {
            info!(
                delivery_id = %payload.delivery_id,
                call_sid = %payload.call_sid,
                "call log synthesized from recording leg"
            );
        }

        let recording = match self.data.get_recording_for_call(&leg.call.id).await? {
            Some(existing) => {
                if !payload.reprocess {
                    debug!(recording_id = %existing.id, "recording already exists");
                }
                existing
            }
            None => {
                let started = Instant::now();
                let audio = self.persist_audio(payload, final_attempt).await?;
                let insert = self
                    .data
                    .insert_recording(&NewRecording {
                        call_log_id: leg.call.id.clone(),
                        audio_url: audio.url,
                        audio_durable: audio.durable,
                        duration_secs: payload.duration_secs,
                    })
                    .await?;
                record_step_latency("persist_audio", started.elapsed().as_secs_f64());
                if insert.inserted() {
                    info!(
                        recording_id = %insert.recording().id,
                        durable = insert.recording().audio_durable,
                        "recording persisted"
                    );
                }
                insert.into_recording()
            }
        };

        self.complete_recording(&payload.delivery_id, recording, final_attempt)
            .await
    }

    async fn process_transcription(
        &self,
        payload: &ProcessTranscriptionPayload,
        final_attempt: bool,
    ) -> Result<(), DoorstepError> {
        let call = self.data.get_call_by_sid(&payload.call_sid).await?;
        let recording = match call {
            Some(call) => self.data.get_recording_for_call(&call.id).await?,
            None => None,
        };
        let Some(recording) = recording else {
            // The recording leg has not been processed yet; try again later.
            return Err(DoorstepError::transient(
                "pipeline",
                format!("no recording yet for call {}", payload.call_sid),
            ));
        };

        let text = payload.text.trim();
        if !text.is_empty() && self.data.set_transcript_if_absent(&recording.id, text).await? {
            info!(recording_id = %recording.id, "provider transcript stored");
        }

        let recording = self.reload(&recording.id).await?;
        self.complete_recording(&payload.delivery_id, recording, final_attempt)
            .await
    }

    /// Fills transcript and intent gaps, then claims and sends the fanout.
    async fn complete_recording(
        &self,
        delivery_id: &str,
        mut recording: Recording,
        final_attempt: bool,
    ) -> Result<(), DoorstepError> {
        if recording.transcript.is_none() {
            let started = Instant::now();
            let result = self
                .speech
                .transcribe(&recording.audio_url, &recording.id, final_attempt)
                .await;
            record_step_latency("transcribe", started.elapsed().as_secs_f64());
            match result.outcome {
                TranscriptionOutcome::Transcribed { text } => {
                    let text = text.trim();
                    if !text.is_empty() {
                        self.data.set_transcript_if_absent(&recording.id, text).await?;
                    }
                }
                TranscriptionOutcome::TranscriptionFailed { reason, retryable }
                    if retryable && !final_attempt =>
                {
                    return Err(DoorstepError::transient("speech", reason));
                }
                TranscriptionOutcome::TranscriptionFailed { reason, .. } => {
                    warn!(
                        recording_id = %recording.id,
                        reason = %reason,
                        "transcription failed, notifying without transcript"
                    );
                }
            }
            recording = self.reload(&recording.id).await?;
        }

        let pending_analysis = match (&recording.transcript, &recording.intent) {
            (Some(text), None) => Some(text.clone()),
            _ => None,
        };
        if let Some(text) = pending_analysis {
            let started = Instant::now();
            let intent = self.analyze(&recording.id, &text, final_attempt).await?;
            record_step_latency("analyze", started.elapsed().as_secs_f64());
            self.data.set_intent_if_absent(&recording.id, &intent).await?;
            recording = self.reload(&recording.id).await?;
        }

        self.notify_recording(delivery_id, &recording).await
    }

    async fn analyze(
        &self,
        recording_id: &str,
        text: &str,
        final_attempt: bool,
    ) -> Result<Intent, DoorstepError> {
        let result = self.speech.analyze(text, recording_id, final_attempt).await;
        match result.outcome {
            AnalysisOutcome::Analyzed { intent } => Ok(intent),
            AnalysisOutcome::AnalyzedByFallback { intent } => {
                debug!(recording_id, "intent produced by keyword fallback");
                Ok(intent)
            }
            AnalysisOutcome::AnalysisFailed { reason, retryable } if retryable && !final_attempt => {
                Err(DoorstepError::transient("speech", reason))
            }
            AnalysisOutcome::AnalysisFailed { reason, .. } => {
                warn!(recording_id, reason = %reason, "analysis failed, using keyword fallback");
                Ok(analyze_fallback(text))
            }
        }
    }

    /// Copies provider audio into the media store, or keeps the provider URL
    /// when the store is disabled or the copy cannot succeed.
    async fn persist_audio(
        &self,
        payload: &ProcessRecordingPayload,
        final_attempt: bool,
    ) -> Result<PersistedAudio, DoorstepError> {
        let provider_audio = || PersistedAudio {
            url: payload.recording_url.clone(),
            durable: false,
        };
        if !self.media.is_enabled() {
            return Ok(provider_audio());
        }

        let name = format!(
            "{}.wav",
            payload.recording_sid.as_deref().unwrap_or(&payload.call_sid)
        );
        let copied = match self.media.fetch(&payload.recording_url).await {
            Ok(audio) => self.media.persist(audio, &name).await,
            Err(e) => Err(e),
        };
        match copied {
            Ok(url) => Ok(PersistedAudio { url, durable: true }),
            Err(e) if e.is_retryable() && !final_attempt => Err(e),
            Err(e) => {
                warn!(
                    call_sid = %payload.call_sid,
                    error = %e,
                    "media persistence failed, keeping provider URL"
                );
                Ok(provider_audio())
            }
        }
    }

    // --- Notifications ---

    async fn notify_recording(
        &self,
        delivery_id: &str,
        recording: &Recording,
    ) -> Result<(), DoorstepError> {
        if !self.data.claim_notification(&recording.id).await? {
            debug!(recording_id = %recording.id, "agent already notified");
            return Ok(());
        }
        let delivery = self.require_delivery(delivery_id).await?;
        let Some(agent) = self.assigned_agent(&delivery).await? else {
            return Ok(());
        };
        self.fanout(&agent, &recording_notification(&delivery, recording))
            .await;
        Ok(())
    }

    async fn notify_unreachable(&self, call: &CallLog) -> Result<(), DoorstepError> {
        let Some(delivery) = self.data.get_delivery(&call.delivery_id).await? else {
            return Ok(());
        };
        let Some(agent) = self.assigned_agent(&delivery).await? else {
            return Ok(());
        };
        let notification = Notification {
            kind: NotificationKind::StatusUpdate,
            delivery_id: delivery.id.clone(),
            title: "Customer unreachable".into(),
            body: format!("Call to the customer at {} ended: {}", delivery.address, call.status),
            data: serde_json::json!({
                "call_log_id": call.id,
                "call_status": call.status,
                "address": delivery.address,
            }),
        };
        self.fanout(&agent, &notification).await;
        Ok(())
    }

    async fn fanout(&self, agent: &Agent, notification: &Notification) -> FanoutReport {
        let started = Instant::now();
        let report = self.notifier.notify(agent, notification).await;
        record_step_latency("notify", started.elapsed().as_secs_f64());
        report
    }

    /// The delivery's agent, resolved from `Delivery.agent_id` only.
    async fn assigned_agent(&self, delivery: &Delivery) -> Result<Option<Agent>, DoorstepError> {
        let Some(agent_id) = delivery.agent_id.as_deref() else {
            info!(delivery_id = %delivery.id, "no agent assigned, skipping fanout");
            return Ok(None);
        };
        let agent = self.data.get_agent(agent_id).await?;
        if agent.is_none() {
            warn!(delivery_id = %delivery.id, agent_id, "assigned agent not found");
        }
        Ok(agent)
    }

    // --- Helpers ---

    async fn require_delivery(&self, delivery_id: &str) -> Result<Delivery, DoorstepError> {
        self.data
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| DoorstepError::NotFound {
                entity: "delivery",
                id: delivery_id.to_string(),
            })
    }

    async fn reload(&self, recording_id: &str) -> Result<Recording, DoorstepError> {
        self.data
            .get_recording(recording_id)
            .await?
            .ok_or_else(|| DoorstepError::NotFound {
                entity: "recording",
                id: recording_id.to_string(),
            })
    }
}

/// Builds the agent notification for a processed recording. Urgent intents
/// go out as emergencies.
pub fn recording_notification(delivery: &Delivery, recording: &Recording) -> Notification {
    let urgent = recording
        .intent
        .as_ref()
        .is_some_and(|intent| intent.priority == Priority::Urgent);
    let (kind, title) = if urgent {
        (NotificationKind::Emergency, "Urgent customer message")
    } else {
        (NotificationKind::NewRecording, "New customer message")
    };
    let body = recording
        .transcript
        .clone()
        .unwrap_or_else(|| "Recording available, no transcript".to_string());

    Notification {
        kind,
        delivery_id: delivery.id.clone(),
        title: title.to_string(),
        body,
        data: serde_json::json!({
            "recording_id": recording.id,
            "audio_url": recording.audio_url,
            "transcript": recording.transcript,
            "intent": recording.intent,
            "address": delivery.address,
        }),
    }
}
