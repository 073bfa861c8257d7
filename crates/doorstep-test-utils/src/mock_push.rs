// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock web-push sender.

use std::sync::Mutex;

use async_trait::async_trait;
use doorstep_notify::{PushDelivery, PushSender};

/// One captured push.
#[derive(Debug, Clone, PartialEq)]
pub struct SentPush {
    pub subscription: String,
    pub payload: serde_json::Value,
    pub urgent: bool,
}

/// Records pushes and answers with a fixed delivery result.
pub struct MockPushSender {
    enabled: bool,
    result: Mutex<PushDelivery>,
    sent: Mutex<Vec<SentPush>>,
}

impl MockPushSender {
    pub fn new() -> Self {
        Self {
            enabled: true,
            result: Mutex::new(PushDelivery::Delivered),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Result returned by subsequent sends.
    pub fn respond_with(&self, result: PushDelivery) {
        *self.result.lock().unwrap() = result;
    }

    pub fn sent(&self) -> Vec<SentPush> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for MockPushSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushSender for MockPushSender {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, subscription: &str, payload: &[u8], urgent: bool) -> PushDelivery {
        if !self.enabled {
            return PushDelivery::Disabled;
        }
        self.sent.lock().unwrap().push(SentPush {
            subscription: subscription.to_string(),
            payload: serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null),
            urgent,
        });
        self.result.lock().unwrap().clone()
    }
}
