//! Server-Sent Events stream of session activity.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use turngate::core::types::DenyReason;

use crate::state::{AppState, EngineEvent};

#[derive(Debug, Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminal: Option<bool>,
}

impl SsePayload {
    fn lifecycle(event_type: &'static str, session_id: &str) -> Self {
        Self {
            event_type,
            session_id: session_id.to_string(),
            operation: None,
            allowed: None,
            reason: None,
            terminal: None,
        }
    }
}

impl From<&EngineEvent> for SsePayload {
    fn from(event: &EngineEvent) -> Self {
        match event {
            EngineEvent::SessionStarted { session_id } => {
                SsePayload::lifecycle("session_started", session_id)
            }
            EngineEvent::SessionEnded { session_id } => {
                SsePayload::lifecycle("session_ended", session_id)
            }
            EngineEvent::Invoked {
                session_id,
                operation,
                allowed,
                reason,
                terminal,
            } => SsePayload {
                event_type: "invoked",
                session_id: session_id.clone(),
                operation: Some(operation.clone()),
                allowed: Some(*allowed),
                reason: reason.clone(),
                terminal: Some(*terminal),
            },
        }
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(engine_event) => {
                    let payload = SsePayload::from(&engine_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("session").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn invoked_payload_carries_reason_code() {
        let event = EngineEvent::Invoked {
            session_id: "call-1".to_string(),
            operation: "verify_identity".to_string(),
            allowed: false,
            reason: Some(DenyReason::CeilingReached { max_attempts: 2 }),
            terminal: true,
        };
        let value: Value =
            serde_json::to_value(SsePayload::from(&event)).expect("serialize payload");
        assert_eq!(
            value,
            json!({
                "type": "invoked",
                "session_id": "call-1",
                "operation": "verify_identity",
                "allowed": false,
                "reason": {"code": "ceiling_reached", "max_attempts": 2},
                "terminal": true,
            })
        );
    }

    #[test]
    fn lifecycle_payload_omits_invocation_fields() {
        let event = EngineEvent::SessionEnded {
            session_id: "call-2".to_string(),
        };
        let value: Value =
            serde_json::to_value(SsePayload::from(&event)).expect("serialize payload");
        assert_eq!(
            value,
            json!({ "type": "session_ended", "session_id": "call-2" })
        );
    }
}
