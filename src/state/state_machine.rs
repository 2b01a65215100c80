use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::player::PlayerKey;

/// Phases a session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Players join and the host starts the game.
    Lobby,
    /// A question is displayed, the clock runs and answers are collected.
    QuestionActive,
    /// The correct answer and the round results are shown.
    Reveal,
    /// Cumulative standings between two questions.
    Scoreboard,
    /// Final ranking after the last question.
    GameOver,
}

/// Triggers that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    /// A player joins from the lobby.
    Join,
    /// The host starts the game with the joined roster.
    StartSession,
    /// A player highlights an answer.
    SelectAnswer,
    /// A player commits the highlighted answer.
    CommitAnswer,
    /// The round clock reached zero.
    ClockExpiry,
    /// Resolution of the round, either requested or driven by commits.
    Reveal,
    /// Switch from the reveal to the standings.
    ShowScoreboard,
    /// Move on after a reveal; `finished` when the quiz has no more questions.
    Advance { finished: bool },
    /// Return to the lobby once the game is over.
    Restart,
    /// Forced return to the lobby from anywhere.
    Abort,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {trigger:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the trigger was received.
    pub from: SessionPhase,
    /// The trigger that cannot be applied from this phase.
    pub trigger: SessionTrigger,
}

/// Reasons an operation was refused. Refusals never change session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    /// The operation is not valid in the current phase.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// A planned transition no longer matches the machine.
    #[error(transparent)]
    Stale(#[from] ApplyError),
    /// The slot already joined this game.
    #[error("{0} already joined")]
    AlreadyJoined(PlayerKey),
    /// The slot did not join this game.
    #[error("{0} has not joined")]
    NotJoined(PlayerKey),
    /// The slot already committed this round.
    #[error("{0} already committed")]
    AlreadyCommitted(PlayerKey),
    /// The slot tried to commit without a selection.
    #[error("{0} has no selection to commit")]
    NoSelection(PlayerKey),
    /// The racing rules do not accept commits from this slot right now.
    #[error("commits are closed for {0}")]
    CommitsClosed(PlayerKey),
    /// The game cannot start without players.
    #[error("no player has joined")]
    NoPlayers,
    /// The quiz provider has no question to show.
    #[error("no question available")]
    NoQuestions,
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// State machine phase changed since the plan was created.
    #[error("state changed during transition (expected {expected:?}, got {actual:?})")]
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// State machine version changed since the plan was created.
    #[error("state version mismatch during transition (expected {expected}, got {actual})")]
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Phase the state machine is currently in.
    pub from: SessionPhase,
    /// Phase the state machine will transition to.
    pub to: SessionPhase,
    /// Trigger of this transition.
    pub trigger: SessionTrigger,
    /// Version number after applying this transition.
    pub version_next: usize,
}

impl Plan {
    /// Whether applying the plan changes the phase.
    pub fn changes_phase(&self) -> bool {
        self.from != self.to
    }
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
}

/// Transition table of the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Lobby,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
        }
    }

    /// Validate that `trigger` can be applied from the current phase.
    pub fn plan(&self, trigger: SessionTrigger) -> Result<Plan, InvalidTransition> {
        let to = self.compute_transition(trigger)?;
        Ok(Plan {
            from: self.phase,
            to,
            trigger,
            version_next: self.version + 1,
        })
    }

    /// Apply a plan produced by [`SessionStateMachine::plan`], returning the new phase.
    pub fn apply(&mut self, plan: Plan) -> Result<SessionPhase, ApplyError> {
        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        Ok(self.phase)
    }

    /// Compute a transition from a trigger if the transition is valid.
    fn compute_transition(&self, trigger: SessionTrigger) -> Result<SessionPhase, InvalidTransition> {
        use SessionPhase::*;
        use SessionTrigger as T;

        let next = match (self.phase, trigger) {
            (Lobby, T::Join) => Lobby,
            (Lobby, T::StartSession) => QuestionActive,
            (QuestionActive, T::SelectAnswer | T::CommitAnswer) => QuestionActive,
            (QuestionActive, T::ClockExpiry | T::Reveal) => Reveal,
            (Reveal, T::ShowScoreboard) => Scoreboard,
            (Reveal | Scoreboard, T::Advance { finished: false }) => QuestionActive,
            (Reveal | Scoreboard, T::Advance { finished: true }) => GameOver,
            (GameOver, T::Restart) => Lobby,
            (_, T::Abort) => Lobby,
            (from, trigger) => return Err(InvalidTransition { from, trigger }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, trigger: SessionTrigger) -> SessionPhase {
        let plan = sm.plan(trigger).unwrap();
        sm.apply(plan).unwrap()
    }

    const ALL_TRIGGERS: [SessionTrigger; 11] = [
        SessionTrigger::Join,
        SessionTrigger::StartSession,
        SessionTrigger::SelectAnswer,
        SessionTrigger::CommitAnswer,
        SessionTrigger::ClockExpiry,
        SessionTrigger::Reveal,
        SessionTrigger::ShowScoreboard,
        SessionTrigger::Advance { finished: false },
        SessionTrigger::Advance { finished: true },
        SessionTrigger::Restart,
        SessionTrigger::Abort,
    ];

    #[test]
    fn initial_state_is_lobby() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Lobby);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(apply(&mut sm, SessionTrigger::Join), SessionPhase::Lobby);
        assert_eq!(
            apply(&mut sm, SessionTrigger::StartSession),
            SessionPhase::QuestionActive
        );
        assert_eq!(
            apply(&mut sm, SessionTrigger::CommitAnswer),
            SessionPhase::QuestionActive
        );
        assert_eq!(apply(&mut sm, SessionTrigger::Reveal), SessionPhase::Reveal);
        assert_eq!(
            apply(&mut sm, SessionTrigger::ShowScoreboard),
            SessionPhase::Scoreboard
        );
        assert_eq!(
            apply(&mut sm, SessionTrigger::Advance { finished: false }),
            SessionPhase::QuestionActive
        );
        assert_eq!(
            apply(&mut sm, SessionTrigger::ClockExpiry),
            SessionPhase::Reveal
        );
        assert_eq!(
            apply(&mut sm, SessionTrigger::Advance { finished: true }),
            SessionPhase::GameOver
        );
        assert_eq!(apply(&mut sm, SessionTrigger::Restart), SessionPhase::Lobby);
        assert_eq!(sm.snapshot().version, 9);
    }

    #[test]
    fn abort_is_valid_everywhere() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionTrigger::StartSession);
        assert_eq!(apply(&mut sm, SessionTrigger::Abort), SessionPhase::Lobby);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let sm = SessionStateMachine::new();
        let err = sm.plan(SessionTrigger::Reveal).unwrap_err();
        assert_eq!(err.from, SessionPhase::Lobby);
        assert_eq!(err.trigger, SessionTrigger::Reveal);
    }

    #[test]
    fn lobby_accepts_only_join_start_and_abort() {
        let sm = SessionStateMachine::new();
        for trigger in ALL_TRIGGERS {
            let allowed = matches!(
                trigger,
                SessionTrigger::Join | SessionTrigger::StartSession | SessionTrigger::Abort
            );
            assert_eq!(sm.plan(trigger).is_ok(), allowed, "{trigger:?}");
        }
    }

    #[test]
    fn game_over_accepts_only_restart_and_abort() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionTrigger::StartSession);
        apply(&mut sm, SessionTrigger::Reveal);
        apply(&mut sm, SessionTrigger::Advance { finished: true });
        for trigger in ALL_TRIGGERS {
            let allowed = matches!(trigger, SessionTrigger::Restart | SessionTrigger::Abort);
            assert_eq!(sm.plan(trigger).is_ok(), allowed, "{trigger:?}");
        }
    }

    fn machine_in(phase: SessionPhase) -> SessionStateMachine {
        let mut sm = SessionStateMachine::new();
        let path: &[SessionTrigger] = match phase {
            SessionPhase::Lobby => &[],
            SessionPhase::QuestionActive => &[SessionTrigger::StartSession],
            SessionPhase::Reveal => &[SessionTrigger::StartSession, SessionTrigger::Reveal],
            SessionPhase::Scoreboard => &[
                SessionTrigger::StartSession,
                SessionTrigger::Reveal,
                SessionTrigger::ShowScoreboard,
            ],
            SessionPhase::GameOver => &[
                SessionTrigger::StartSession,
                SessionTrigger::Reveal,
                SessionTrigger::Advance { finished: true },
            ],
        };
        for trigger in path {
            apply(&mut sm, *trigger);
        }
        assert_eq!(sm.phase(), phase);
        sm
    }

    fn expected_target(phase: SessionPhase, trigger: SessionTrigger) -> Option<SessionPhase> {
        use SessionPhase::*;
        use SessionTrigger as T;

        match (phase, trigger) {
            (_, T::Abort) => Some(Lobby),
            (Lobby, T::Join) => Some(Lobby),
            (Lobby, T::StartSession) => Some(QuestionActive),
            (QuestionActive, T::SelectAnswer | T::CommitAnswer) => Some(QuestionActive),
            (QuestionActive, T::ClockExpiry | T::Reveal) => Some(Reveal),
            (Reveal, T::ShowScoreboard) => Some(Scoreboard),
            (Reveal | Scoreboard, T::Advance { finished: false }) => Some(QuestionActive),
            (Reveal | Scoreboard, T::Advance { finished: true }) => Some(GameOver),
            (GameOver, T::Restart) => Some(Lobby),
            _ => None,
        }
    }

    #[test]
    fn every_phase_matches_transition_table() {
        let phases = [
            SessionPhase::Lobby,
            SessionPhase::QuestionActive,
            SessionPhase::Reveal,
            SessionPhase::Scoreboard,
            SessionPhase::GameOver,
        ];
        for phase in phases {
            for trigger in ALL_TRIGGERS {
                let mut sm = machine_in(phase);
                let before = sm.snapshot();
                match (expected_target(phase, trigger), sm.plan(trigger)) {
                    (Some(to), Ok(plan)) => {
                        assert_eq!(sm.apply(plan).unwrap(), to, "{phase:?} {trigger:?}");
                        assert_eq!(sm.snapshot().version, before.version + 1);
                    }
                    (None, Err(err)) => {
                        assert_eq!(err, InvalidTransition { from: phase, trigger });
                        assert_eq!(sm.snapshot(), before, "{phase:?} {trigger:?}");
                    }
                    (expected, got) => {
                        panic!("{phase:?} {trigger:?}: expected {expected:?}, got {got:?}")
                    }
                }
            }
        }
    }

    #[test]
    fn stale_plan_is_refused() {
        let mut sm = SessionStateMachine::new();
        let stale = sm.plan(SessionTrigger::Join).unwrap();
        apply(&mut sm, SessionTrigger::StartSession);
        let err = sm.apply(stale).unwrap_err();
        assert_eq!(
            err,
            ApplyError::PhaseMismatch {
                expected: SessionPhase::Lobby,
                actual: SessionPhase::QuestionActive,
            }
        );
    }
}
