// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Doorstep pipeline.
//!
//! Exposes the telephony webhooks (signature-validated, durably enqueued
//! before acknowledging), the bearer-protected control API used by the CRUD
//! layer, agent WebSocket rooms, and unauthenticated health and metrics.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod webhooks;
pub mod ws;

pub use auth::AuthConfig;
pub use server::{GatewayState, HealthState, ServerConfig, WebhookConfig, build_router, start_server};
