use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Controller bridges currently connected.
    pub devices: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(devices: usize) -> Self {
        Self {
            status: "ok".to_string(),
            devices,
        }
    }

    /// Create a health response indicating the session queue is gone.
    pub fn degraded(devices: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            devices,
        }
    }
}
