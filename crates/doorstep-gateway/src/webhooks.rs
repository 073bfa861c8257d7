// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telephony provider webhooks.
//!
//! Every hook validates the provider signature against the canonical public
//! URL plus the inbound path and query. Recording and transcription events
//! are durably enqueued before the handler answers 2xx; a failed enqueue
//! answers 503 so the provider retries.

use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use doorstep_core::{
    CallStatus, DoorstepError, EnqueueOptions, JobPayload, ProcessRecordingPayload,
    ProcessTranscriptionPayload,
};
use doorstep_prometheus::record_webhook;
use doorstep_telephony::twiml;

use crate::server::GatewayState;

/// Header carrying the provider's HMAC signature.
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Query string shared by the per-delivery hooks.
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryQuery {
    #[serde(default)]
    pub delivery_id: Option<String>,
}

/// Form-encoded provider parameters, in arrival order.
type Params = Vec<(String, String)>;

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn rejected(hook: &'static str, status: StatusCode, outcome: &'static str, reason: &str) -> Response {
    warn!(hook, %status, reason, "webhook rejected");
    record_webhook(hook, outcome);
    (status, reason.to_string()).into_response()
}

/// Checks the signature header against the canonical URL of this request.
fn verify(
    state: &GatewayState,
    hook: &'static str,
    headers: &HeaderMap,
    uri: &Uri,
    params: &Params,
) -> Result<(), Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if signature.is_empty() {
        return Err(rejected(hook, StatusCode::UNAUTHORIZED, "unauthorized", "missing signature"));
    }

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = state.webhooks.signed_url(path_and_query);
    if state
        .coordinator
        .telephony()
        .validate_webhook(signature, &url, params)
    {
        Ok(())
    } else {
        Err(rejected(hook, StatusCode::UNAUTHORIZED, "unauthorized", "invalid signature"))
    }
}

fn required_delivery(hook: &'static str, query: &DeliveryQuery) -> Result<String, Response> {
    match query.delivery_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(rejected(hook, StatusCode::BAD_REQUEST, "invalid", "missing delivery_id")),
    }
}

fn enqueue_failed(hook: &'static str, err: &DoorstepError) -> Response {
    warn!(hook, error = %err, "webhook enqueue failed");
    record_webhook(hook, "unavailable");
    (StatusCode::SERVICE_UNAVAILABLE, "queue unavailable").into_response()
}

/// `POST /webhooks/voice?delivery_id=<id>`: the answered leg asks what to
/// play. Answers with the prompt and a record action.
pub async fn voice(
    State(state): State<GatewayState>,
    Query(query): Query<DeliveryQuery>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Params>,
) -> Response {
    const HOOK: &str = "voice";
    if let Err(response) = verify(&state, HOOK, &headers, &uri, &params) {
        return response;
    }
    let delivery_id = match required_delivery(HOOK, &query) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match twiml::voice_response(
        &state.webhooks.voice_prompt,
        &state.webhooks.public_base_url,
        &delivery_id,
    ) {
        Ok(body) => {
            debug!(delivery_id, call_sid = param(&params, "CallSid"), "voice script served");
            record_webhook(HOOK, "accepted");
            xml(StatusCode::OK, body)
        }
        Err(err) => rejected(HOOK, StatusCode::INTERNAL_SERVER_ERROR, "error", &err.to_string()),
    }
}

/// `POST /webhooks/recording?delivery_id=<id>`: the recording leg finished.
pub async fn recording(
    State(state): State<GatewayState>,
    Query(query): Query<DeliveryQuery>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Params>,
) -> Response {
    const HOOK: &str = "recording";
    if let Err(response) = verify(&state, HOOK, &headers, &uri, &params) {
        return response;
    }
    let delivery_id = match required_delivery(HOOK, &query) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let (Some(call_sid), Some(recording_url)) =
        (param(&params, "CallSid"), param(&params, "RecordingUrl"))
    else {
        return rejected(HOOK, StatusCode::BAD_REQUEST, "invalid", "missing CallSid or RecordingUrl");
    };
    let Some(duration_secs) = param(&params, "RecordingDuration").and_then(|d| d.parse::<u32>().ok())
    else {
        return rejected(HOOK, StatusCode::BAD_REQUEST, "invalid", "missing or invalid RecordingDuration");
    };

    if duration_secs < 1 {
        info!(delivery_id, call_sid, "empty recording ignored");
        record_webhook(HOOK, "ignored");
        return xml(StatusCode::OK, twiml::goodbye_response());
    }

    let payload = JobPayload::ProcessRecording(ProcessRecordingPayload {
        delivery_id: delivery_id.clone(),
        call_sid: call_sid.to_string(),
        recording_url: recording_url.to_string(),
        recording_sid: param(&params, "RecordingSid").map(str::to_string),
        duration_secs,
        reprocess: false,
    });
    match state
        .coordinator
        .queue()
        .enqueue(&payload, EnqueueOptions::deduped(format!("recording:{call_sid}")))
        .await
    {
        Ok(job_id) => {
            info!(delivery_id, call_sid, job_id, duration_secs, "recording queued");
            record_webhook(HOOK, "accepted");
            xml(StatusCode::OK, twiml::goodbye_response())
        }
        Err(err) => enqueue_failed(HOOK, &err),
    }
}

/// `POST /webhooks/transcription?delivery_id=<id>`: provider-side transcript.
pub async fn transcription(
    State(state): State<GatewayState>,
    Query(query): Query<DeliveryQuery>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Params>,
) -> Response {
    const HOOK: &str = "transcription";
    if let Err(response) = verify(&state, HOOK, &headers, &uri, &params) {
        return response;
    }
    let delivery_id = match required_delivery(HOOK, &query) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(call_sid) = param(&params, "CallSid") else {
        return rejected(HOOK, StatusCode::BAD_REQUEST, "invalid", "missing CallSid");
    };
    // Failed provider transcriptions arrive with no text.
    let Some(text) = param(&params, "TranscriptionText") else {
        debug!(delivery_id, call_sid, "empty provider transcript ignored");
        record_webhook(HOOK, "ignored");
        return xml(StatusCode::OK, twiml::empty_response());
    };

    let payload = JobPayload::ProcessTranscription(ProcessTranscriptionPayload {
        delivery_id: delivery_id.clone(),
        call_sid: call_sid.to_string(),
        text: text.to_string(),
    });
    match state
        .coordinator
        .queue()
        .enqueue(
            &payload,
            EnqueueOptions::deduped(format!("transcription:{call_sid}")),
        )
        .await
    {
        Ok(job_id) => {
            info!(delivery_id, call_sid, job_id, "provider transcript queued");
            record_webhook(HOOK, "accepted");
            xml(StatusCode::OK, twiml::empty_response())
        }
        Err(err) => enqueue_failed(HOOK, &err),
    }
}

/// `POST /webhooks/call-status`: call leg progress. Applied inline since it
/// is a single guarded row update.
pub async fn call_status(
    State(state): State<GatewayState>,
    Query(query): Query<DeliveryQuery>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Params>,
) -> Response {
    const HOOK: &str = "call-status";
    if let Err(response) = verify(&state, HOOK, &headers, &uri, &params) {
        return response;
    }
    let (Some(call_sid), Some(raw_status)) =
        (param(&params, "CallSid"), param(&params, "CallStatus"))
    else {
        return rejected(HOOK, StatusCode::BAD_REQUEST, "invalid", "missing CallSid or CallStatus");
    };
    let Some(status) = CallStatus::from_provider(raw_status) else {
        debug!(call_sid, raw_status, "unknown call status ignored");
        record_webhook(HOOK, "ignored");
        return xml(StatusCode::OK, twiml::empty_response());
    };
    let duration = param(&params, "CallDuration").and_then(|d| d.parse::<u32>().ok());
    let delivery_id = query
        .delivery_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    match state
        .coordinator
        .record_call_status(delivery_id, call_sid, status, duration)
        .await
    {
        Ok(sync) => {
            record_webhook(HOOK, if sync.transitioned { "accepted" } else { "ignored" });
            xml(StatusCode::OK, twiml::empty_response())
        }
        Err(err @ DoorstepError::NotFound { .. }) => {
            rejected(HOOK, StatusCode::NOT_FOUND, "invalid", &err.to_string())
        }
        Err(err) if err.is_retryable() => enqueue_failed(HOOK, &err),
        Err(err) => rejected(HOOK, StatusCode::INTERNAL_SERVER_ERROR, "error", &err.to_string()),
    }
}
