use std::time::Duration;

use serde::Serialize;
use serde_with::{DurationMilliSeconds, serde_as};
use utoipa::ToSchema;

use crate::state::{
    game::{AnswerColor, AnswerOptions, Question},
    player::PlayerKey,
    scoring::RoundResult,
    state_machine::SessionPhase,
};

/// Everything the session tells its observers, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The phase changed.
    StateChange {
        from: SessionPhase,
        to: SessionPhase,
    },
    PlayerJoined {
        player: PlayerKey,
    },
    /// A question became active.
    QuestionStarted(QuestionView),
    AnswerSelected {
        player: PlayerKey,
        color: AnswerColor,
    },
    AnswerCommitted {
        player: PlayerKey,
        color: AnswerColor,
    },
    /// A racing round latched its first committer.
    FirstCommit {
        player: PlayerKey,
    },
    /// Every joined player committed before the clock ran out.
    AllPlayersCommitted,
    /// Seconds left on the round clock.
    TimerTick {
        value: u32,
    },
    TimeExpired,
    RoundResolved(RoundSummary),
    NewHighScore {
        score: u32,
    },
    GameOver(GameOverSummary),
}

impl SessionEvent {
    /// Stable event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::StateChange { .. } => "stateChange",
            SessionEvent::PlayerJoined { .. } => "playerJoined",
            SessionEvent::QuestionStarted(_) => "questionStarted",
            SessionEvent::AnswerSelected { .. } => "answerSelected",
            SessionEvent::AnswerCommitted { .. } => "answerCommitted",
            SessionEvent::FirstCommit { .. } => "firstCommit",
            SessionEvent::AllPlayersCommitted => "allPlayersCommitted",
            SessionEvent::TimerTick { .. } => "timerTick",
            SessionEvent::TimeExpired => "timeExpired",
            SessionEvent::RoundResolved(_) => "roundResolved",
            SessionEvent::NewHighScore { .. } => "newHighScore",
            SessionEvent::GameOver(_) => "gameOver",
        }
    }
}

/// Question as shown to players; the correct colour stays hidden until the reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionView {
    /// One-based round number.
    pub round: u32,
    /// Zero-based position of the question in the quiz.
    pub index: usize,
    /// Number of questions in the quiz.
    pub total: usize,
    pub id: u32,
    pub prompt: String,
    pub answers: AnswerOptions,
    /// Seconds on the clock when the question opened.
    pub seconds: u32,
}

impl QuestionView {
    pub fn new(round: u32, index: usize, total: usize, question: &Question, seconds: u32) -> Self {
        Self {
            round,
            index,
            total,
            id: question.id,
            prompt: question.prompt.clone(),
            answers: question.answers.clone(),
            seconds,
        }
    }
}

/// Scored outcome of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoundSummary {
    pub round: u32,
    pub correct_color: AnswerColor,
    pub results: Vec<RoundResult>,
}

impl RoundSummary {
    /// Players who answered correctly, in slot order.
    pub fn correct_players(&self) -> impl Iterator<Item = PlayerKey> + '_ {
        self.results
            .iter()
            .filter(|result| result.correct)
            .map(|result| result.player)
    }
}

/// Final position of one player.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RankedPlayer {
    /// One-based position.
    pub rank: usize,
    pub player: PlayerKey,
    pub score: u32,
    pub correct_answers: u32,
    pub best_streak: u32,
    /// Summed commit delays, the tie breaker.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "commit_ms")]
    #[schema(value_type = u64)]
    pub commit_time: Duration,
}

/// Aggregate figures of a finished game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct GameStats {
    /// Rounds that reached a reveal.
    pub questions_played: u32,
    /// Rounds where at least one player answered correctly.
    pub rounds_with_correct: u32,
    /// Longest streak any player reached.
    pub best_streak: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GameOverSummary {
    /// Joined players, best first.
    pub ranking: Vec<RankedPlayer>,
    pub winner: Option<PlayerKey>,
    pub stats: GameStats,
}
