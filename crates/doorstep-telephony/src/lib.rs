// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telephony adapter for the Doorstep pipeline.
//!
//! Drives a Twilio-compatible provider over its REST surface (call placement,
//! SMS) and validates the signatures on its inbound webhooks. Without
//! credentials the adapter runs disabled: placement and SMS return
//! [`DoorstepError::Disabled`] and every webhook signature is rejected.

pub mod client;
pub mod signature;
pub mod twiml;

use std::time::Duration;

use async_trait::async_trait;
use doorstep_config::model::TelephonyConfig;
use doorstep_core::{
    AdapterType, CallRequest, CallStatus, DoorstepError, HealthStatus, PlacedCall, PluginAdapter,
    TelephonyAdapter,
};
use tracing::{debug, info, warn};

use crate::client::TwilioClient;

/// Builds `<base><path>?delivery_id=<id>` with the id query-encoded.
pub fn webhook_url(base: &str, path: &str, delivery_id: &str) -> Result<String, DoorstepError> {
    let raw = format!("{}{path}", base.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&raw, &[("delivery_id", delivery_id)])
        .map(String::from)
        .map_err(|e| DoorstepError::Config(format!("invalid callback base URL {base:?}: {e}")))
}

/// Twilio-compatible telephony adapter implementing [`TelephonyAdapter`].
pub struct TwilioTelephony {
    client: Option<TwilioClient>,
    auth_token: Option<String>,
}

impl TwilioTelephony {
    /// Creates the adapter. Missing account id, auth token or caller number
    /// yields a disabled adapter rather than an error.
    pub fn new(config: &TelephonyConfig) -> Result<Self, DoorstepError> {
        let (Some(sid), Some(token), Some(from)) = (
            config.account_sid.clone(),
            config.auth_token.clone(),
            config.caller_number.clone(),
        ) else {
            warn!("telephony credentials missing, adapter disabled");
            return Ok(Self::disabled());
        };

        let client = TwilioClient::new(
            &config.api_base,
            sid,
            token.clone(),
            from,
            Duration::from_secs(config.place_timeout_secs),
        )?;
        info!(api_base = %config.api_base, "telephony adapter initialized");

        Ok(Self {
            client: Some(client),
            auth_token: Some(token),
        })
    }

    /// An adapter with no credentials.
    pub fn disabled() -> Self {
        Self {
            client: None,
            auth_token: None,
        }
    }

    fn client(&self) -> Result<&TwilioClient, DoorstepError> {
        self.client
            .as_ref()
            .ok_or(DoorstepError::Disabled { adapter: "telephony" })
    }
}

#[async_trait]
impl PluginAdapter for TwilioTelephony {
    fn name(&self) -> &str {
        "twilio"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Telephony
    }

    fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        if self.is_enabled() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded("telephony credentials not configured".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        Ok(())
    }
}

#[async_trait]
impl TelephonyAdapter for TwilioTelephony {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, DoorstepError> {
        let client = self.client()?;
        let answer_url = webhook_url(&request.callback_base, "/webhooks/voice", &request.delivery_id)?;
        let status_callback = webhook_url(
            &request.callback_base,
            "/webhooks/call-status",
            &request.delivery_id,
        )?;

        let call = client
            .create_call(&request.to, &answer_url, &status_callback)
            .await?;
        let status = CallStatus::from_provider(&call.status).unwrap_or(CallStatus::Queued);
        debug!(
            delivery_id = %request.delivery_id,
            call_sid = %call.sid,
            status = %status,
            "call placed"
        );

        Ok(PlacedCall {
            call_sid: call.sid,
            status,
        })
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), DoorstepError> {
        let message = self.client()?.create_message(to, body).await?;
        debug!(message_sid = %message.sid, "sms sent");
        Ok(())
    }

    fn validate_webhook(&self, signature: &str, url: &str, params: &[(String, String)]) -> bool {
        match &self.auth_token {
            Some(token) => signature::verify_signature(token, signature, url, params),
            None => false,
        }
    }
}
