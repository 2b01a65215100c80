use std::time::{Duration, Instant};

use crate::state::{
    game::{AnswerColor, Question},
    player::PlayerKey,
    state_machine::Rejected,
};

/// Selection and commit state of one slot during a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Currently highlighted answer, if any.
    pub selection: Option<AnswerColor>,
    /// Delay between round start and the commit, once committed.
    pub committed_after: Option<Duration>,
}

impl LedgerEntry {
    pub fn is_committed(&self) -> bool {
        self.committed_after.is_some()
    }
}

/// Per-round record of every slot's selection and commit.
///
/// The ledger only enforces the freeze-after-commit rule; whether a slot is
/// joined is checked by the session before it writes here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerLedger {
    entries: [LedgerEntry; 4],
}

impl AnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, player: PlayerKey) -> &LedgerEntry {
        &self.entries[player.index()]
    }

    pub fn is_committed(&self, player: PlayerKey) -> bool {
        self.entry(player).is_committed()
    }

    /// Overwrite the selection of an uncommitted slot.
    pub fn select(&mut self, player: PlayerKey, color: AnswerColor) -> Result<(), Rejected> {
        let entry = &mut self.entries[player.index()];
        if entry.is_committed() {
            return Err(Rejected::AlreadyCommitted(player));
        }
        entry.selection = Some(color);
        Ok(())
    }

    /// Freeze the current selection, recording how long after the round start it happened.
    pub fn commit(&mut self, player: PlayerKey, after: Duration) -> Result<AnswerColor, Rejected> {
        let entry = &mut self.entries[player.index()];
        if entry.is_committed() {
            return Err(Rejected::AlreadyCommitted(player));
        }
        let color = entry.selection.ok_or(Rejected::NoSelection(player))?;
        entry.committed_after = Some(after);
        Ok(color)
    }

    /// Number of committed slots.
    pub fn committed_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_committed()).count()
    }
}

/// Resolution status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Unresolved,
    Resolved,
}

/// Player latched as the first committer of a racing round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstCommit {
    pub player: PlayerKey,
    pub after: Duration,
}

/// Scratch state of the question currently in play.
#[derive(Debug, Clone)]
pub struct Round {
    /// One-based round number within the game.
    pub number: u32,
    /// Question being asked.
    pub question: Question,
    /// When the answer window opened.
    pub started_at: Instant,
    /// Length of the answer window.
    pub duration: Duration,
    /// First committer, latched by racing rounds only.
    pub first_commit: Option<FirstCommit>,
    /// Selections and commits of the round.
    pub ledger: AnswerLedger,
    /// Whether scores were already applied.
    pub status: RoundStatus,
}

impl Round {
    pub fn new(number: u32, question: Question, started_at: Instant, duration: Duration) -> Self {
        Self {
            number,
            question,
            started_at,
            duration,
            first_commit: None,
            ledger: AnswerLedger::new(),
            status: RoundStatus::Unresolved,
        }
    }

    /// Time since the answer window opened, never negative.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn is_resolved(&self) -> bool {
        self.status == RoundStatus::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_can_change_until_commit() {
        let mut ledger = AnswerLedger::new();
        ledger.select(PlayerKey::One, AnswerColor::Blue).unwrap();
        ledger.select(PlayerKey::One, AnswerColor::Green).unwrap();
        let committed = ledger
            .commit(PlayerKey::One, Duration::from_millis(800))
            .unwrap();
        assert_eq!(committed, AnswerColor::Green);

        assert_eq!(
            ledger.select(PlayerKey::One, AnswerColor::Yellow),
            Err(Rejected::AlreadyCommitted(PlayerKey::One))
        );
        assert_eq!(
            ledger.entry(PlayerKey::One).selection,
            Some(AnswerColor::Green)
        );
    }

    #[test]
    fn commit_requires_selection_and_happens_once() {
        let mut ledger = AnswerLedger::new();
        assert_eq!(
            ledger.commit(PlayerKey::Two, Duration::ZERO),
            Err(Rejected::NoSelection(PlayerKey::Two))
        );
        ledger.select(PlayerKey::Two, AnswerColor::Orange).unwrap();
        ledger.commit(PlayerKey::Two, Duration::from_secs(1)).unwrap();
        assert_eq!(
            ledger.commit(PlayerKey::Two, Duration::from_secs(2)),
            Err(Rejected::AlreadyCommitted(PlayerKey::Two))
        );
        assert_eq!(
            ledger.entry(PlayerKey::Two).committed_after,
            Some(Duration::from_secs(1))
        );
        assert_eq!(ledger.committed_count(), 1);
    }
}
