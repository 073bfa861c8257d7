// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock telephony provider.
//!
//! Places calls with sequential call ids (`CA1`, `CA2`, ...), captures SMS,
//! and validates webhook signatures with the real HMAC algorithm so tests
//! exercise the same check production does.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use doorstep_core::{
    AdapterType, CallRequest, CallStatus, DoorstepError, HealthStatus, PlacedCall, PluginAdapter,
    TelephonyAdapter,
};
use doorstep_telephony::signature::{compute_signature, verify_signature};

use crate::MockFailure;

/// Auth token the mock signs and validates with.
pub const TEST_AUTH_TOKEN: &str = "test-auth-token";

#[derive(Default)]
struct State {
    next_sid: u32,
    placed: Vec<CallRequest>,
    sms: Vec<(String, String)>,
    failures: VecDeque<MockFailure>,
}

/// A mock telephony adapter.
pub struct MockTelephony {
    enabled: bool,
    auth_token: String,
    state: Mutex<State>,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self {
            enabled: true,
            auth_token: TEST_AUTH_TOKEN.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// A provider without credentials.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Makes the next `place_call` fail.
    pub fn fail_next_call(&self, failure: MockFailure) {
        self.state.lock().unwrap().failures.push_back(failure);
    }

    /// Calls placed so far, in order.
    pub fn placed_calls(&self) -> Vec<CallRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    /// `(to, body)` of every SMS sent.
    pub fn sent_sms(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sms.clone()
    }

    /// Signature the provider would send for `url` and `params`.
    pub fn sign(&self, url: &str, params: &[(String, String)]) -> String {
        compute_signature(&self.auth_token, url, params)
    }
}

impl Default for MockTelephony {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTelephony {
    fn name(&self) -> &str {
        "mock-telephony"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Telephony
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        Ok(())
    }
}

#[async_trait]
impl TelephonyAdapter for MockTelephony {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, DoorstepError> {
        if !self.enabled {
            return Err(DoorstepError::Disabled {
                adapter: "telephony",
            });
        }
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error("telephony"));
        }
        state.next_sid += 1;
        state.placed.push(request.clone());
        Ok(PlacedCall {
            call_sid: format!("CA{}", state.next_sid),
            status: CallStatus::Queued,
        })
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), DoorstepError> {
        if !self.enabled {
            return Err(DoorstepError::Disabled {
                adapter: "telephony",
            });
        }
        self.state
            .lock()
            .unwrap()
            .sms
            .push((to.to_string(), body.to_string()));
        Ok(())
    }

    fn validate_webhook(&self, signature: &str, url: &str, params: &[(String, String)]) -> bool {
        self.enabled && verify_signature(&self.auth_token, signature, url, params)
    }
}
