// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent WebSocket rooms.
//!
//! `GET /ws?agent_id=<id>&token=<t>` joins topic `agent_<id>`. The server
//! pushes JSON events and ignores client text:
//! ```json
//! {"type": "new-recording", "delivery_id": "D1", "recording_id": "R1", "payload": {...}}
//! ```

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use doorstep_notify::{RealtimeEvent, topic_for_agent};

use crate::server::GatewayState;

/// Handshake query.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub agent_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The bearer token travels in the query since
/// browsers cannot set headers on the handshake.
pub async fn ws_handler(
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query.token.as_deref().unwrap_or_default();
    if !state.auth.accepts(token) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.coordinator.data().get_agent(&query.agent_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "agent lookup failed during ws handshake");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let topic = topic_for_agent(&query.agent_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, topic))
}

/// Forwards room events until either side goes away.
async fn handle_socket(socket: WebSocket, state: GatewayState, topic: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = state.coordinator.notifier().hub().subscribe(&topic);
    tracing::debug!(topic = %topic, "agent socket joined");

    let forward_topic = topic.clone();
    let sender_task = tokio::spawn(async move {
        loop {
            let event: RealtimeEvent = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %forward_topic, skipped, "agent socket lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "unserializable realtime event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    sender_task.abort();
    tracing::debug!(topic = %topic, "agent socket left");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_query_token_is_optional() {
        let q: WsQuery = serde_json::from_str(r#"{"agent_id": "A1"}"#).unwrap();
        assert_eq!(q.agent_id, "A1");
        assert!(q.token.is_none());
    }
}
