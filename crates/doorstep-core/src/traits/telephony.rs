// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telephony provider adapter trait.

use async_trait::async_trait;

use crate::error::DoorstepError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CallRequest, PlacedCall};

/// Drives a telephony provider over its REST and webhook surface.
#[async_trait]
pub trait TelephonyAdapter: PluginAdapter {
    /// Places an outbound call whose answered leg fetches the voice webhook.
    ///
    /// Provider 4xx responses are permanent errors; 5xx and timeouts are
    /// transient.
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, DoorstepError>;

    /// Sends a text message from the configured caller number.
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), DoorstepError>;

    /// Validates a webhook signature against the exact request URL and its
    /// form parameters. A disabled adapter rejects every signature.
    fn validate_webhook(&self, signature: &str, url: &str, params: &[(String, String)]) -> bool;
}
