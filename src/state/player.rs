use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::ledger::AnswerLedger;

/// One of the four fixed controller slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum PlayerKey {
    #[serde(rename = "player1")]
    One,
    #[serde(rename = "player2")]
    Two,
    #[serde(rename = "player3")]
    Three,
    #[serde(rename = "player4")]
    Four,
}

impl PlayerKey {
    /// Slots in their stable display order.
    pub const ALL: [PlayerKey; 4] = [
        PlayerKey::One,
        PlayerKey::Two,
        PlayerKey::Three,
        PlayerKey::Four,
    ];

    /// Zero-based slot index.
    pub fn index(self) -> usize {
        match self {
            PlayerKey::One => 0,
            PlayerKey::Two => 1,
            PlayerKey::Three => 2,
            PlayerKey::Four => 3,
        }
    }

    /// One-based controller number printed on the hardware.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Resolve a one-based controller number.
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(PlayerKey::One),
            2 => Some(PlayerKey::Two),
            3 => Some(PlayerKey::Three),
            4 => Some(PlayerKey::Four),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player{}", self.number())
    }
}

/// Per-slot bookkeeping that survives across rounds of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Slot identity.
    pub key: PlayerKey,
    /// Whether the slot takes part in the current game.
    pub joined: bool,
    /// Cumulative score, never negative.
    pub score: u32,
    /// Consecutive correct rounds.
    pub streak: u32,
    /// Longest streak reached during the current game.
    pub best_streak: u32,
    /// Number of rounds answered correctly in the current game.
    pub correct_answers: u32,
    /// Sum of commit delays across the game, used to break score ties.
    pub commit_time_total: Duration,
}

impl Player {
    fn new(key: PlayerKey) -> Self {
        Self {
            key,
            joined: false,
            score: 0,
            streak: 0,
            best_streak: 0,
            correct_answers: 0,
            commit_time_total: Duration::ZERO,
        }
    }

    /// Clear everything a new game starts without, keeping the joined flag.
    fn reset_game_fields(&mut self) {
        *self = Self {
            joined: self.joined,
            ..Self::new(self.key)
        };
    }
}

/// Owner of the four player slots.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    players: [Player; 4],
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self {
            players: PlayerKey::ALL.map(Player::new),
        }
    }
}

impl PlayerRegistry {
    /// Fresh registry with every slot unjoined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of a slot.
    pub fn get(&self, key: PlayerKey) -> &Player {
        &self.players[key.index()]
    }

    pub(crate) fn get_mut(&mut self, key: PlayerKey) -> &mut Player {
        &mut self.players[key.index()]
    }

    /// All four slots in stable order.
    pub fn all(&self) -> &[Player] {
        &self.players
    }

    /// Joined players in stable slot order.
    pub fn joined(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|player| player.joined)
    }

    /// Keys of the joined players in stable slot order.
    pub fn joined_keys(&self) -> Vec<PlayerKey> {
        self.joined().map(|player| player.key).collect()
    }

    /// Number of joined players.
    pub fn joined_count(&self) -> usize {
        self.joined().count()
    }

    pub fn is_joined(&self, key: PlayerKey) -> bool {
        self.get(key).joined
    }

    /// True iff at least one player joined and every joined player committed in `ledger`.
    pub fn all_committed(&self, ledger: &AnswerLedger) -> bool {
        let mut joined = self.joined().peekable();
        joined.peek().is_some() && joined.all(|player| ledger.is_committed(player.key))
    }

    /// Mark a slot as joined with fresh per-game fields. Returns `false` when already joined.
    pub(crate) fn join(&mut self, key: PlayerKey) -> bool {
        let player = self.get_mut(key);
        if player.joined {
            return false;
        }
        *player = Player::new(key);
        player.joined = true;
        true
    }

    /// Reset scores, streaks and statistics of every slot; joined flags are kept.
    pub(crate) fn reset_game(&mut self) {
        self.players.iter_mut().for_each(Player::reset_game_fields);
    }

    /// Return every slot to its unjoined initial state.
    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }
}
