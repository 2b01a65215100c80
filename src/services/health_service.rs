use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the session queue still accepts commands.
pub fn health_status(state: &SharedState) -> HealthResponse {
    if state.is_degraded() {
        warn!("session queue closed (degraded mode)");
        HealthResponse::degraded(state.devices().connected())
    } else {
        HealthResponse::ok(state.devices().connected())
    }
}
