//! Controller light signalling.
//!
//! [`indicator_commands`] turns session events into light commands;
//! [`DeviceHub`] pushes them to every connected controller bridge and
//! remembers the steady light state so a reconnecting bridge can be resynced.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::IndicatorCommand,
    services::websocket_service::send_message_to_websocket,
    state::{events::SessionEvent, player::PlayerKey, state_machine::SessionPhase},
};

/// Number of blinks for a correct answer at the reveal.
pub const REVEAL_FLASH_TIMES: u32 = 3;
/// Delay between two blinks, in milliseconds.
pub const REVEAL_FLASH_INTERVAL_MS: u64 = 200;

/// Sink for fire-and-forget light commands.
pub trait Indicator: Send + Sync {
    fn dispatch(&self, command: IndicatorCommand);
}

/// Light commands that accompany a session event.
pub fn indicator_commands(event: &SessionEvent) -> Vec<IndicatorCommand> {
    match event {
        SessionEvent::PlayerJoined { player } | SessionEvent::AnswerCommitted { player, .. } => {
            vec![IndicatorCommand::SetOne {
                player: *player,
                on: true,
            }]
        }
        SessionEvent::QuestionStarted(_) => vec![IndicatorCommand::SetAll { on: false }],
        SessionEvent::RoundResolved(summary) => {
            let mut commands = vec![IndicatorCommand::SetAll { on: false }];
            commands.extend(summary.correct_players().map(|player| IndicatorCommand::Flash {
                player,
                times: REVEAL_FLASH_TIMES,
                interval_ms: REVEAL_FLASH_INTERVAL_MS,
            }));
            commands
        }
        SessionEvent::GameOver(summary) => summary
            .winner
            .map(|winner| IndicatorCommand::Victory { winner })
            .into_iter()
            .collect(),
        SessionEvent::StateChange {
            to: SessionPhase::Lobby,
            ..
        } => vec![IndicatorCommand::SetAll { on: false }],
        _ => Vec::new(),
    }
}

/// Handle used to push messages to a connected controller bridge.
#[derive(Clone)]
pub struct DeviceConnection {
    pub id: String,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Registry of connected controller bridges.
#[derive(Default)]
pub struct DeviceHub {
    connections: DashMap<String, DeviceConnection>,
    lights: DashMap<PlayerKey, bool>,
}

impl DeviceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge, replacing any previous connection with the same id.
    pub fn register(&self, connection: DeviceConnection) {
        self.connections.insert(connection.id.clone(), connection);
    }

    pub fn unregister(&self, id: &str) {
        self.connections.remove(id);
    }

    pub fn connected(&self) -> usize {
        self.connections.len()
    }

    /// Whether a player's light is currently on.
    pub fn light(&self, player: PlayerKey) -> bool {
        self.lights.get(&player).is_some_and(|on| *on)
    }

    /// Commands restoring the steady light state on a fresh connection.
    pub fn resync_commands(&self) -> Vec<IndicatorCommand> {
        PlayerKey::ALL
            .into_iter()
            .map(|player| IndicatorCommand::SetOne {
                player,
                on: self.light(player),
            })
            .collect()
    }

    fn remember(&self, command: &IndicatorCommand) {
        match command {
            IndicatorCommand::SetOne { player, on } => {
                self.lights.insert(*player, *on);
            }
            IndicatorCommand::SetAll { on } => {
                for player in PlayerKey::ALL {
                    self.lights.insert(player, *on);
                }
            }
            IndicatorCommand::Victory { winner } => {
                self.lights.insert(*winner, true);
            }
            IndicatorCommand::Flash { .. } => {}
        }
    }
}

impl Indicator for DeviceHub {
    fn dispatch(&self, command: IndicatorCommand) {
        self.remember(&command);
        let targets: Vec<DeviceConnection> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        if targets.is_empty() {
            debug!(command = ?command, "no controller bridge connected");
            return;
        }

        for connection in targets {
            if send_message_to_websocket(&connection.tx, &command).is_err() {
                warn!(id = %connection.id, "bridge writer closed, removing connection");
                self.connections.remove(&connection.id);
            }
        }
    }
}
