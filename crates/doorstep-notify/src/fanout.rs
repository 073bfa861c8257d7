// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Three-channel notification fanout.

use std::sync::Arc;

use doorstep_core::{Agent, DataPlane, Notification, NotificationKind, TelephonyAdapter};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::realtime::{RealtimeEvent, RealtimeHub, topic_for_agent};
use crate::{PushDelivery, PushSender};

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    Sms,
    Realtime,
}

impl Channel {
    fn label(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Realtime => "realtime",
        }
    }
}

/// What happened on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum ChannelOutcome {
    Sent,
    /// Channel not configured for this agent or adapter disabled.
    Skipped,
    Failed(String),
}

impl ChannelOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-channel outcomes of one fanout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub push: ChannelOutcome,
    pub sms: ChannelOutcome,
    pub realtime: ChannelOutcome,
}

impl FanoutReport {
    pub fn any_sent(&self) -> bool {
        [&self.push, &self.sms, &self.realtime]
            .iter()
            .any(|outcome| **outcome == ChannelOutcome::Sent)
    }
}

/// Fans notifications out to an agent's channels.
pub struct Notifier {
    data: Arc<dyn DataPlane>,
    push: Arc<dyn PushSender>,
    telephony: Arc<dyn TelephonyAdapter>,
    hub: Arc<RealtimeHub>,
}

impl Notifier {
    pub fn new(
        data: Arc<dyn DataPlane>,
        push: Arc<dyn PushSender>,
        telephony: Arc<dyn TelephonyAdapter>,
        hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            data,
            push,
            telephony,
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    pub fn push_enabled(&self) -> bool {
        self.push.is_enabled()
    }

    /// Attempts every channel concurrently. Never fails.
    pub async fn notify(&self, agent: &Agent, notification: &Notification) -> FanoutReport {
        let (push, sms, realtime) = tokio::join!(
            self.send_push(agent, notification),
            self.send_sms(agent, notification),
            async { self.publish(agent, notification) },
        );

        for (channel, outcome) in [
            (Channel::Push, &push),
            (Channel::Sms, &sms),
            (Channel::Realtime, &realtime),
        ] {
            if let ChannelOutcome::Failed(reason) = outcome {
                warn!(
                    agent_id = %agent.id,
                    delivery_id = %notification.delivery_id,
                    channel = channel.label(),
                    reason = %reason,
                    "notification channel failed"
                );
            }
            metrics::counter!(
                "doorstep_notifications_total",
                "channel" => channel.label(),
                "outcome" => outcome.label(),
            )
            .increment(1);
        }

        info!(
            agent_id = %agent.id,
            delivery_id = %notification.delivery_id,
            kind = %notification.kind,
            push = push.label(),
            sms = sms.label(),
            realtime = realtime.label(),
            "agent notified"
        );
        FanoutReport { push, sms, realtime }
    }

    async fn send_push(&self, agent: &Agent, notification: &Notification) -> ChannelOutcome {
        let Some(subscription) = agent.push_subscription.as_deref() else {
            return ChannelOutcome::Skipped;
        };
        let payload = serde_json::json!({
            "kind": notification.kind,
            "title": notification.title,
            "body": notification.body,
            "delivery_id": notification.delivery_id,
            "data": notification.data,
        });
        let urgent = notification.kind == NotificationKind::Emergency;

        match self
            .push
            .send(subscription, payload.to_string().as_bytes(), urgent)
            .await
        {
            PushDelivery::Delivered => ChannelOutcome::Sent,
            PushDelivery::Disabled => ChannelOutcome::Skipped,
            PushDelivery::Failed(reason) => ChannelOutcome::Failed(reason),
            PushDelivery::Expired => {
                debug!(agent_id = %agent.id, "push subscription expired, clearing");
                if let Err(e) = self.data.clear_push_subscription(&agent.id).await {
                    warn!(agent_id = %agent.id, error = %e, "failed to clear push subscription");
                }
                ChannelOutcome::Failed("subscription expired".into())
            }
        }
    }

    async fn send_sms(&self, agent: &Agent, notification: &Notification) -> ChannelOutcome {
        let Some(phone) = agent.phone.as_deref() else {
            return ChannelOutcome::Skipped;
        };
        if !self.telephony.is_enabled() {
            return ChannelOutcome::Skipped;
        }
        let body = sms_body(notification);
        match self.telephony.send_sms(phone, &body).await {
            Ok(()) => ChannelOutcome::Sent,
            Err(e) => ChannelOutcome::Failed(e.to_string()),
        }
    }

    fn publish(&self, agent: &Agent, notification: &Notification) -> ChannelOutcome {
        let event = RealtimeEvent {
            event_type: notification.kind.to_string(),
            delivery_id: notification.delivery_id.clone(),
            recording_id: notification
                .data
                .get("recording_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            payload: serde_json::json!({
                "title": notification.title,
                "body": notification.body,
                "data": notification.data,
            }),
        };
        match self.hub.publish(&topic_for_agent(&agent.id), event) {
            0 => ChannelOutcome::Skipped,
            _ => ChannelOutcome::Sent,
        }
    }
}

fn sms_body(notification: &Notification) -> String {
    if notification.body.is_empty() {
        notification.title.clone()
    } else {
        format!("{}: {}", notification.title, notification.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use doorstep_core::{
        AdapterType, CallRequest, DoorstepError, HealthStatus, PlacedCall, PluginAdapter,
    };
    use doorstep_storage::{Database, QueuePolicy, SqliteStorage};
    use std::sync::Mutex;

    struct StubPush(PushDelivery);

    #[async_trait]
    impl PushSender for StubPush {
        fn is_enabled(&self) -> bool {
            self.0 != PushDelivery::Disabled
        }

        async fn send(&self, _: &str, _: &[u8], _: bool) -> PushDelivery {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct StubSms {
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PluginAdapter for StubSms {
        fn name(&self) -> &str {
            "stub"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Telephony
        }
        async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), DoorstepError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TelephonyAdapter for StubSms {
        async fn place_call(&self, _: &CallRequest) -> Result<PlacedCall, DoorstepError> {
            Err(DoorstepError::Disabled { adapter: "stub" })
        }
        async fn send_sms(&self, to: &str, body: &str) -> Result<(), DoorstepError> {
            if self.fail {
                return Err(DoorstepError::transient("telephony", "503"));
            }
            self.sent.lock().unwrap().push((to.into(), body.into()));
            Ok(())
        }
        fn validate_webhook(&self, _: &str, _: &str, _: &[(String, String)]) -> bool {
            false
        }
    }

    fn agent() -> Agent {
        Agent {
            id: "A1".into(),
            name: "Grace".into(),
            phone: Some("+15550002222".into()),
            push_subscription: Some(r#"{"endpoint":"https://push.example/1"}"#.into()),
        }
    }

    fn notification(kind: NotificationKind) -> Notification {
        Notification {
            kind,
            delivery_id: "D1".into(),
            title: "New recording".into(),
            body: "leave at door".into(),
            data: serde_json::json!({"recording_id": "R1"}),
        }
    }

    async fn storage() -> Arc<SqliteStorage> {
        let db = Database::open_in_memory().await.unwrap();
        let storage = SqliteStorage::from_database(db, QueuePolicy::default());
        storage.insert_agent(&agent()).await.unwrap();
        Arc::new(storage)
    }

    #[tokio::test]
    async fn all_channels_attempted() {
        let sms = Arc::new(StubSms::default());
        let hub = Arc::new(RealtimeHub::new());
        let mut rx = hub.subscribe("agent_A1");
        let notifier = Notifier::new(
            storage().await,
            Arc::new(StubPush(PushDelivery::Delivered)),
            sms.clone(),
            hub,
        );

        let report = notifier
            .notify(&agent(), &notification(NotificationKind::NewRecording))
            .await;
        assert_eq!(report.push, ChannelOutcome::Sent);
        assert_eq!(report.sms, ChannelOutcome::Sent);
        assert_eq!(report.realtime, ChannelOutcome::Sent);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "new-recording");
        assert_eq!(event.recording_id.as_deref(), Some("R1"));
        assert_eq!(
            sms.sent.lock().unwrap()[0],
            ("+15550002222".to_string(), "New recording: leave at door".to_string())
        );
    }

    #[tokio::test]
    async fn channel_failures_are_isolated() {
        let sms = Arc::new(StubSms {
            fail: true,
            ..StubSms::default()
        });
        let notifier = Notifier::new(
            storage().await,
            Arc::new(StubPush(PushDelivery::Failed("boom".into()))),
            sms,
            Arc::new(RealtimeHub::new()),
        );

        let report = notifier
            .notify(&agent(), &notification(NotificationKind::StatusUpdate))
            .await;
        assert_eq!(report.push, ChannelOutcome::Failed("boom".into()));
        assert!(matches!(report.sms, ChannelOutcome::Failed(_)));
        assert_eq!(report.realtime, ChannelOutcome::Skipped);
        assert!(!report.any_sent());
    }

    #[tokio::test]
    async fn expired_subscription_is_cleared() {
        let data = storage().await;
        let notifier = Notifier::new(
            data.clone(),
            Arc::new(StubPush(PushDelivery::Expired)),
            Arc::new(StubSms::default()),
            Arc::new(RealtimeHub::new()),
        );

        notifier
            .notify(&agent(), &notification(NotificationKind::Emergency))
            .await;
        let stored = data.get_agent("A1").await.unwrap().unwrap();
        assert!(stored.push_subscription.is_none());
    }

    #[tokio::test]
    async fn missing_contact_points_are_skipped() {
        let notifier = Notifier::new(
            storage().await,
            Arc::new(StubPush(PushDelivery::Disabled)),
            Arc::new(StubSms::default()),
            Arc::new(RealtimeHub::new()),
        );
        let bare = Agent {
            phone: None,
            push_subscription: None,
            ..agent()
        };
        let report = notifier
            .notify(&bare, &notification(NotificationKind::NewDelivery))
            .await;
        assert_eq!(report.push, ChannelOutcome::Skipped);
        assert_eq!(report.sms, ChannelOutcome::Skipped);
    }
}
