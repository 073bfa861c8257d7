// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control API, health and metrics handlers.
//!
//! Control responses are structured `{success, ...}` JSON; failures carry
//! `{success: false, error}`.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use doorstep_core::{CallLog, DoorstepError, JobKind, PluginAdapter, QueueStats};
use doorstep_pipeline::PipelineState;

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Maps a pipeline error onto the user-facing status codes.
pub fn status_for(err: &DoorstepError) -> StatusCode {
    match err {
        DoorstepError::NotFound { .. } => StatusCode::NOT_FOUND,
        DoorstepError::Conflict(_) => StatusCode::CONFLICT,
        DoorstepError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        DoorstepError::Signature => StatusCode::UNAUTHORIZED,
        DoorstepError::Disabled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        err if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "control request failed");
        }
        error_response(status, self.0.to_string())
    }
}

/// Wrapper so handlers can `?` pipeline errors.
pub struct ApiError(pub DoorstepError);

impl From<DoorstepError> for ApiError {
    fn from(err: DoorstepError) -> Self {
        Self(err)
    }
}

/// `POST /calls/initiate` body.
#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub delivery_id: String,
    /// Delay before placing the call, in seconds.
    #[serde(default)]
    pub delay: Option<u64>,
}

/// Response for queued work.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub success: bool,
    pub job_id: i64,
    pub status: &'static str,
}

impl QueuedResponse {
    fn queued(job_id: i64) -> Self {
        Self {
            success: true,
            job_id,
            status: "queued",
        }
    }
}

/// POST /calls/initiate
pub async fn post_initiate_call(
    State(state): State<GatewayState>,
    body: Result<Json<InitiateRequest>, JsonRejection>,
) -> Result<Json<QueuedResponse>, Response> {
    let Json(request) = body.map_err(|rejection| {
        error_response(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;
    let delivery_id = request.delivery_id.trim();
    if delivery_id.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "delivery_id is required"));
    }

    let delay = Duration::from_secs(request.delay.unwrap_or(0));
    let job_id = state
        .coordinator
        .request_call(delivery_id, delay)
        .await
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(QueuedResponse::queued(job_id)))
}

/// Response for `GET /calls/{delivery_id}`.
#[derive(Debug, Serialize)]
pub struct CallsResponse {
    pub success: bool,
    pub delivery_id: String,
    pub state: PipelineState,
    pub calls: Vec<CallLog>,
}

/// GET /calls/{delivery_id}
pub async fn get_calls(
    State(state): State<GatewayState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<CallsResponse>, ApiError> {
    let pipeline_state = state.coordinator.pipeline_state(&delivery_id).await?;
    let calls = state.coordinator.data().list_calls(&delivery_id).await?;
    Ok(Json(CallsResponse {
        success: true,
        delivery_id,
        state: pipeline_state,
        calls,
    }))
}

/// POST /recordings/{recording_id}/reprocess
pub async fn post_reprocess(
    State(state): State<GatewayState>,
    Path(recording_id): Path<String>,
) -> Result<Json<QueuedResponse>, ApiError> {
    let job_id = state.coordinator.reprocess(&recording_id).await?;
    Ok(Json(QueuedResponse::queued(job_id)))
}

/// Response for `GET /queue/stats`.
#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub success: bool,
    pub total: QueueStats,
    pub kinds: BTreeMap<String, QueueStats>,
}

/// GET /queue/stats
pub async fn get_queue_stats(
    State(state): State<GatewayState>,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    let queue = state.coordinator.queue();
    let total = queue.stats(None).await?;
    let mut kinds = BTreeMap::new();
    for kind in JobKind::iter() {
        kinds.insert(kind.to_string(), queue.stats(Some(kind)).await?);
    }
    Ok(Json(QueueStatsResponse {
        success: true,
        total,
        kinds,
    }))
}

/// Which adapters have credentials and are live.
#[derive(Debug, Serialize)]
pub struct AdapterHealth {
    pub telephony: bool,
    pub media: bool,
    pub speech: bool,
    pub push: bool,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub adapters: AdapterHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

/// GET /health (unauthenticated)
///
/// Reports `degraded` when the queue cannot be read.
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;
    let adapters = AdapterHealth {
        telephony: coordinator.telephony().is_enabled(),
        media: coordinator.media().is_enabled(),
        speech: coordinator.speech().adapter().is_enabled(),
        push: coordinator.notifier().push_enabled(),
    };
    let queue = match coordinator.queue().stats(None).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not read queue stats");
            None
        }
    };
    Json(HealthResponse {
        status: if queue.is_some() { "ok" } else { "degraded" },
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        adapters,
        queue,
    })
}

/// GET /metrics (unauthenticated)
///
/// Renders Prometheus text exposition, or 404 when the exporter is off.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
