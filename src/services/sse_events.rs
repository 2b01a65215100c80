use serde::Serialize;
use tracing::warn;

use crate::{dto::sse::ServerEvent, state::SseHub, state::events::SessionEvent};

/// Forward a session event to every public SSE subscriber under its wire name.
pub fn broadcast_session_event(hub: &SseHub, event: &SessionEvent) {
    send_public_event(hub, event.name(), event);
}

fn send_public_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
