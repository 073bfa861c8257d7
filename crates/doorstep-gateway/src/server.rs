// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use doorstep_core::DoorstepError;
use doorstep_pipeline::Coordinator;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::webhooks;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Settings the telephony webhooks need.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Canonical public base URL. Signatures are checked against this base
    /// plus the inbound path and query, since proxies rewrite the Host.
    pub public_base_url: String,
    /// Prompt spoken before recording.
    pub voice_prompt: String,
}

impl WebhookConfig {
    /// The URL the provider signed for a request with `path_and_query`.
    pub fn signed_url(&self, path_and_query: &str) -> String {
        format!(
            "{}{path_and_query}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub coordinator: Arc<Coordinator>,
    pub webhooks: WebhookConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Health state for unauthenticated endpoints.
    pub health: HealthState,
}

/// Gateway bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Builds the router:
/// - `GET /health`, `GET /metrics` (public)
/// - `POST /webhooks/{voice,recording,transcription,call-status}` (provider signature)
/// - `POST /calls/initiate`, `GET /calls/{delivery_id}`,
///   `POST /recordings/{id}/reprocess`, `GET /queue/stats` (bearer auth)
/// - `GET /ws` (token in query, checked during the handshake)
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state.clone());

    let webhook_routes = Router::new()
        .route("/webhooks/voice", post(webhooks::voice))
        .route("/webhooks/recording", post(webhooks::recording))
        .route("/webhooks/transcription", post(webhooks::transcription))
        .route("/webhooks/call-status", post(webhooks::call_status))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/calls/initiate", post(handlers::post_initiate_call))
        .route("/calls/{delivery_id}", get(handlers::get_calls))
        .route(
            "/recordings/{recording_id}/reprocess",
            post(handlers::post_reprocess),
        )
        .route("/queue/stats", get(handlers::get_queue_stats))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds and serves until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), DoorstepError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DoorstepError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| DoorstepError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
