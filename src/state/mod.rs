pub mod clock;
pub mod events;
pub mod game;
pub mod ledger;
pub mod player;
pub mod scoring;
pub mod session;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::high_score::HighScoreStore,
    services::{indicator_service::DeviceHub, session_service::SessionHandle},
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Handles shared by every HTTP, SSE and websocket handler.
///
/// Game state itself lives in the session task; handlers only hold the
/// [`SessionHandle`] that feeds its queue.
pub struct AppState {
    session: SessionHandle,
    sse: SseHub,
    devices: Arc<DeviceHub>,
    high_scores: Arc<dyn HighScoreStore>,
    config: AppConfig,
}

impl AppState {
    /// Wrap the handles in an [`Arc`] so they can be cloned cheaply.
    pub fn new(
        session: SessionHandle,
        sse: SseHub,
        devices: Arc<DeviceHub>,
        high_scores: Arc<dyn HighScoreStore>,
        config: AppConfig,
    ) -> SharedState {
        Arc::new(Self {
            session,
            sse,
            devices,
            high_scores,
            config,
        })
    }

    /// Entry point into the session queue.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Registry of connected controller bridges.
    pub fn devices(&self) -> &DeviceHub {
        &self.devices
    }

    pub fn high_scores(&self) -> &Arc<dyn HighScoreStore> {
        &self.high_scores
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Whether the session queue is gone and operations can no longer run.
    pub fn is_degraded(&self) -> bool {
        self.session.is_closed()
    }
}
