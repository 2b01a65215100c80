//! Maps raw controller presses onto session operations according to the phase.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::state::{
    game::AnswerColor,
    player::PlayerKey,
    session::Session,
    state_machine::{Rejected, SessionPhase},
};

/// Longest pause allowed between two presses of the lobby start sequence.
pub const START_SEQUENCE_WINDOW: Duration = Duration::from_secs(2);

/// What a button means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonRole {
    Commit,
    Answer(AnswerColor),
}

/// One debounced press delivered by the input layer.
///
/// Device timestamps are not carried: commit times are read from the session's
/// time source when the queue processes the press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub player: PlayerKey,
    pub button: ButtonRole,
}

/// Session operation a press was turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputAction {
    Join,
    Start,
    Select,
    Commit,
    Restart,
}

/// Result of routing one press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InputOutcome {
    /// The press ran a session operation.
    Applied { action: InputAction },
    /// The press advanced the lobby start sequence by one step.
    Sequence { step: usize },
    /// The press means nothing in the current phase.
    Ignored,
    /// The session refused the operation.
    Rejected { reason: String },
}

/// Lobby start sequence: every answer colour in button order, each within the window.
#[derive(Debug, Clone, Default)]
struct StartSequence {
    progress: usize,
    last_press: Option<Instant>,
}

impl StartSequence {
    /// Register a colour press; returns the number of matched steps.
    fn press(&mut self, color: AnswerColor, now: Instant) -> usize {
        let expired = self
            .last_press
            .is_some_and(|last| now.saturating_duration_since(last) > START_SEQUENCE_WINDOW);
        if expired {
            self.reset();
        }

        if AnswerColor::ALL.get(self.progress) == Some(&color) {
            self.progress += 1;
            self.last_press = Some(now);
        } else if color == AnswerColor::ALL[0] {
            self.progress = 1;
            self.last_press = Some(now);
        } else {
            self.reset();
        }
        self.progress
    }

    fn is_complete(&self) -> bool {
        self.progress == AnswerColor::ALL.len()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stateful press router living next to the session on the event queue.
#[derive(Debug, Clone, Default)]
pub struct InputRouter {
    sequence: StartSequence,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `press` to `session` as the current phase dictates.
    pub fn route(&mut self, session: &mut Session, press: ButtonPress, now: Instant) -> InputOutcome {
        let phase = session.phase();
        if phase != SessionPhase::Lobby {
            self.sequence.reset();
        }

        let result = match (phase, press.button) {
            (SessionPhase::Lobby, ButtonRole::Commit) => {
                session.join(press.player).map(|()| InputAction::Join)
            }
            (SessionPhase::Lobby, ButtonRole::Answer(color)) => {
                let step = self.sequence.press(color, now);
                if !self.sequence.is_complete() {
                    return if step == 0 {
                        InputOutcome::Ignored
                    } else {
                        InputOutcome::Sequence { step }
                    };
                }
                self.sequence.reset();
                session.start_session().map(|()| InputAction::Start)
            }
            (SessionPhase::QuestionActive, ButtonRole::Answer(color)) => session
                .select_answer(press.player, color)
                .map(|()| InputAction::Select),
            (SessionPhase::QuestionActive, ButtonRole::Commit) => session
                .commit_answer(press.player)
                .map(|_| InputAction::Commit),
            (SessionPhase::GameOver, ButtonRole::Commit) => {
                session.restart().map(|()| InputAction::Restart)
            }
            _ => return InputOutcome::Ignored,
        };

        match result {
            Ok(action) => InputOutcome::Applied { action },
            Err(err) => rejected(press, err),
        }
    }
}

fn rejected(press: ButtonPress, err: Rejected) -> InputOutcome {
    debug!(player = %press.player, button = ?press.button, reason = %err, "press rejected");
    InputOutcome::Rejected {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::quiz_store::QuizDeck,
        state::{clock::ManualTimeSource, game::GameSettings},
    };

    fn session() -> Session {
        Session::new(
            GameSettings::default(),
            Box::new(QuizDeck::fallback()),
            Arc::new(ManualTimeSource::new()),
            0,
        )
    }

    fn press(player: PlayerKey, button: ButtonRole) -> ButtonPress {
        ButtonPress { player, button }
    }

    fn colors(
        router: &mut InputRouter,
        session: &mut Session,
        start: Instant,
        gap: Duration,
    ) -> InputOutcome {
        let mut outcome = InputOutcome::Ignored;
        for (step, color) in AnswerColor::ALL.into_iter().enumerate() {
            outcome = router.route(
                session,
                press(PlayerKey::One, ButtonRole::Answer(color)),
                start + gap * step as u32,
            );
        }
        outcome
    }

    #[test]
    fn commit_joins_in_the_lobby() {
        let mut session = session();
        let mut router = InputRouter::new();
        let now = Instant::now();
        assert_eq!(
            router.route(&mut session, press(PlayerKey::Two, ButtonRole::Commit), now),
            InputOutcome::Applied {
                action: InputAction::Join
            }
        );
        assert!(matches!(
            router.route(&mut session, press(PlayerKey::Two, ButtonRole::Commit), now),
            InputOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn colour_sequence_starts_the_game() {
        let mut session = session();
        let mut router = InputRouter::new();
        let now = Instant::now();
        router.route(&mut session, press(PlayerKey::One, ButtonRole::Commit), now);

        let outcome = colors(&mut router, &mut session, now, Duration::from_millis(500));
        assert_eq!(
            outcome,
            InputOutcome::Applied {
                action: InputAction::Start
            }
        );
        assert_eq!(session.phase(), SessionPhase::QuestionActive);
    }

    #[test]
    fn slow_or_wrong_sequence_resets() {
        let mut session = session();
        let mut router = InputRouter::new();
        let now = Instant::now();
        router.route(&mut session, press(PlayerKey::One, ButtonRole::Commit), now);

        let outcome = colors(&mut router, &mut session, now, Duration::from_secs(3));
        assert_eq!(outcome, InputOutcome::Ignored);
        assert_eq!(session.phase(), SessionPhase::Lobby);

        let blue = press(PlayerKey::One, ButtonRole::Answer(AnswerColor::Blue));
        let green = press(PlayerKey::One, ButtonRole::Answer(AnswerColor::Green));
        assert_eq!(
            router.route(&mut session, blue, now),
            InputOutcome::Sequence { step: 1 }
        );
        assert_eq!(router.route(&mut session, green, now), InputOutcome::Ignored);
        assert_eq!(
            router.route(&mut session, blue, now),
            InputOutcome::Sequence { step: 1 }
        );
    }

    #[test]
    fn question_phase_selects_and_commits() {
        let mut session = session();
        let mut router = InputRouter::new();
        let now = Instant::now();
        session.join(PlayerKey::One).unwrap();
        session.join(PlayerKey::Two).unwrap();
        session.start_session().unwrap();

        let select = press(PlayerKey::One, ButtonRole::Answer(AnswerColor::Blue));
        assert_eq!(
            router.route(&mut session, select, now),
            InputOutcome::Applied {
                action: InputAction::Select
            }
        );
        assert_eq!(
            router.route(&mut session, press(PlayerKey::One, ButtonRole::Commit), now),
            InputOutcome::Applied {
                action: InputAction::Commit
            }
        );
        assert!(matches!(
            router.route(&mut session, press(PlayerKey::Two, ButtonRole::Commit), now),
            InputOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn reveal_ignores_presses_and_game_over_restarts() {
        let mut session = session();
        let mut router = InputRouter::new();
        let now = Instant::now();
        session.join(PlayerKey::One).unwrap();
        session.start_session().unwrap();
        session.reveal().unwrap();

        assert_eq!(
            router.route(&mut session, press(PlayerKey::One, ButtonRole::Commit), now),
            InputOutcome::Ignored
        );
        session.advance().unwrap();
        assert_eq!(session.phase(), SessionPhase::GameOver);
        assert_eq!(
            router.route(&mut session, press(PlayerKey::Three, ButtonRole::Commit), now),
            InputOutcome::Applied {
                action: InputAction::Restart
            }
        );
        assert_eq!(session.phase(), SessionPhase::Lobby);
    }
}
