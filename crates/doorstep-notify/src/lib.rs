// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent notification fanout for the Doorstep pipeline.
//!
//! A notification is delivered over three independent channels: web push to
//! the agent's stored subscription, SMS through the telephony adapter, and a
//! real-time event on the agent's topic. Channel failures are logged and
//! reported, never propagated.

pub mod fanout;
pub mod realtime;
pub mod webpush;

use async_trait::async_trait;

pub use fanout::{Channel, ChannelOutcome, FanoutReport, Notifier};
pub use realtime::{RealtimeEvent, RealtimeHub, topic_for_agent};
pub use webpush::{PushSubscription, VapidSigner, WebPushSender};

/// Result of one push delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDelivery {
    Delivered,
    /// The push service no longer accepts the subscription (or it is malformed).
    Expired,
    Failed(String),
    /// No VAPID keys configured.
    Disabled,
}

/// Sends an encrypted payload to a stored web-push subscription.
#[async_trait]
pub trait PushSender: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// `subscription` is the stored JSON document; `urgent` maps to the
    /// `Urgency: high` header.
    async fn send(&self, subscription: &str, payload: &[u8], urgent: bool) -> PushDelivery;
}
