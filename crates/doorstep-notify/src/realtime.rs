// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic-per-agent real-time event hub.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

/// Room name for an agent.
pub fn topic_for_agent(agent_id: &str) -> String {
    format!("agent_{agent_id}")
}

/// Event pushed to subscribed sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub delivery_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
    pub payload: serde_json::Value,
}

/// In-process pub/sub keyed by topic string.
///
/// Delivery is FIFO per topic and best-effort: a lagging subscriber loses
/// the oldest events.
#[derive(Default)]
pub struct RealtimeHub {
    topics: DashMap<String, broadcast::Sender<RealtimeEvent>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<RealtimeEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publishes to a topic and returns how many subscribers received it.
    pub fn publish(&self, topic: &str, event: RealtimeEvent) -> usize {
        let delivered = match self.topics.get(topic) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            // Nobody is listening; drop the idle topic.
            self.topics
                .remove_if(topic, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(delivery_id: &str) -> RealtimeEvent {
        RealtimeEvent {
            event_type: "new-recording".into(),
            delivery_id: delivery_id.into(),
            recording_id: Some("R1".into()),
            payload: serde_json::json!({"title": "hi"}),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let hub = RealtimeHub::new();
        let mut rx = hub.subscribe("agent_A1");
        assert_eq!(hub.publish("agent_A1", event("D1")), 1);
        assert_eq!(hub.publish("agent_A1", event("D2")), 1);
        assert_eq!(rx.recv().await.unwrap().delivery_id, "D1");
        assert_eq!(rx.recv().await.unwrap().delivery_id, "D2");
    }

    #[test]
    fn topics_are_isolated() {
        let hub = RealtimeHub::new();
        let mut other = hub.subscribe("agent_B");
        assert_eq!(hub.publish("agent_A", event("D1")), 0);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn idle_topic_is_dropped() {
        let hub = RealtimeHub::new();
        let rx = hub.subscribe(&topic_for_agent("A1"));
        assert_eq!(hub.subscriber_count("agent_A1"), 1);
        drop(rx);
        assert_eq!(hub.publish("agent_A1", event("D1")), 0);
        assert_eq!(hub.subscriber_count("agent_A1"), 0);
    }

    #[test]
    fn event_json_shape() {
        let json = serde_json::to_value(event("D1")).unwrap();
        assert_eq!(json["type"], "new-recording");
        assert_eq!(json["recording_id"], "R1");
        let mut without = event("D1");
        without.recording_id = None;
        let json = serde_json::to_value(without).unwrap();
        assert!(json.get("recording_id").is_none());
    }
}
