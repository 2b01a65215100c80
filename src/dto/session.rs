use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::ws::DeviceButton,
    state::{
        events::{GameOverSummary, QuestionView},
        game::{AnswerColor, ScoringPolicy},
        player::PlayerKey,
        scoring::RoundResult,
        session::Session,
        state_machine::SessionPhase,
    },
};

#[derive(Debug, Deserialize, ToSchema)]
/// Payload naming the player slot an operation applies to.
pub struct PlayerRequest {
    pub player: PlayerKey,
}

#[derive(Debug, Deserialize, ToSchema)]
/// Payload used to highlight an answer.
pub struct SelectRequest {
    pub player: PlayerKey,
    pub color: AnswerColor,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// Raw press forwarded by an input bridge without a websocket.
pub struct PressRequest {
    /// Controller number printed on the hardware (1 to 4).
    #[validate(range(min = 1, max = 4))]
    pub controller: u8,
    pub button: DeviceButton,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Public view of one player slot.
pub struct PlayerSnapshot {
    pub player: PlayerKey,
    pub joined: bool,
    pub score: u32,
    pub streak: u32,
    /// Answer highlighted this round. Hidden while the question is open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<AnswerColor>,
    pub committed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// State of the round in play.
pub struct RoundSnapshot {
    pub question: QuestionView,
    /// Seconds left on the clock while the question is open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_commit: Option<PlayerKey>,
    /// Correct colour, only once the round is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_color: Option<AnswerColor>,
    pub results: Vec<RoundResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Full read model returned by `GET /session` and every session operation.
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// Number of transitions applied so far.
    pub version: usize,
    pub quiz_title: String,
    pub policy: ScoringPolicy,
    pub high_score: u32,
    pub players: Vec<PlayerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_over: Option<GameOverSummary>,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        let phase = session.phase();
        let open = phase == SessionPhase::QuestionActive;
        let round = session.round();

        let players = session
            .players()
            .all()
            .iter()
            .map(|player| {
                let entry = round.map(|round| *round.ledger.entry(player.key));
                PlayerSnapshot {
                    player: player.key,
                    joined: player.joined,
                    score: player.score,
                    streak: player.streak,
                    selection: entry.and_then(|entry| entry.selection).filter(|_| !open),
                    committed: entry.is_some_and(|entry| entry.is_committed()),
                }
            })
            .collect();

        let round = round.map(|round| {
            let progress = session.quiz_progress();
            RoundSnapshot {
                question: QuestionView::new(
                    round.number,
                    progress.index,
                    progress.total,
                    &round.question,
                    session.settings().seconds_per_question,
                ),
                remaining: session.remaining_seconds(),
                first_commit: round.first_commit.map(|first| first.player),
                correct_color: round.is_resolved().then_some(round.question.correct),
                results: session.last_results().to_vec(),
            }
        });

        Self {
            phase,
            version: session.version(),
            quiz_title: session.quiz_title().to_string(),
            policy: session.settings().policy,
            high_score: session.high_score(),
            players,
            round,
            game_over: session.outcome().cloned(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Stored best score.
pub struct HighScoreResponse {
    pub score: u32,
}
