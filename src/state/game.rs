use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use utoipa::ToSchema;
use validator::Validate;

/// One of the four answer buttons, rendered as the colour of the physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerColor {
    /// Top answer button.
    Blue,
    /// Second answer button.
    Orange,
    /// Third answer button.
    Green,
    /// Bottom answer button.
    Yellow,
}

impl AnswerColor {
    /// All colours in the order the buttons appear on the controller.
    pub const ALL: [AnswerColor; 4] = [
        AnswerColor::Blue,
        AnswerColor::Orange,
        AnswerColor::Green,
        AnswerColor::Yellow,
    ];

    /// Lowercase label used in logs and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerColor::Blue => "blue",
            AnswerColor::Orange => "orange",
            AnswerColor::Green => "green",
            AnswerColor::Yellow => "yellow",
        }
    }
}

impl fmt::Display for AnswerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four answer texts of a question, one per button colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnswerOptions {
    pub blue: String,
    pub orange: String,
    pub green: String,
    pub yellow: String,
}

impl AnswerOptions {
    /// Text shown on the given button.
    pub fn get(&self, color: AnswerColor) -> &str {
        match color {
            AnswerColor::Blue => &self.blue,
            AnswerColor::Orange => &self.orange,
            AnswerColor::Green => &self.green,
            AnswerColor::Yellow => &self.yellow,
        }
    }
}

/// Immutable quiz question as supplied by the quiz provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Identifier from the quiz file.
    pub id: u32,
    /// Prompt text displayed to players.
    pub prompt: String,
    /// Answer option texts keyed by colour.
    pub answers: AnswerOptions,
    /// The colour holding the correct answer.
    pub correct: AnswerColor,
    /// Base points for a correct answer; `None` falls back to the configured default.
    pub points: Option<u32>,
}

impl Question {
    /// Whether `color` is the right answer to this question.
    pub fn is_correct(&self, color: AnswerColor) -> bool {
        self.correct == color
    }

    /// Base point value used by the scoring engine.
    pub fn base_points(&self, settings: &GameSettings) -> u32 {
        self.points.unwrap_or(settings.points_correct)
    }
}

/// How a round is resolved into score deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Only the first committer can win the fast bonus or suffer the penalty.
    #[default]
    Racing,
    /// Every player answers independently; correct answers earn base points times streak.
    OpenFlat,
    /// Like [`ScoringPolicy::OpenFlat`] plus a bonus that decays with answer time.
    OpenSpeed,
}

impl ScoringPolicy {
    /// Racing rounds latch a first committer; open rounds do not.
    pub fn is_racing(self) -> bool {
        matches!(self, ScoringPolicy::Racing)
    }
}

/// Behaviour of other players once the first commit of a racing round was latched.
#[serde_as]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RacingRules {
    /// Close the round on the first commit and reveal immediately.
    pub exclusive: bool,
    /// Reject every other commit for this long after the first commit.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "lockout_ms")]
    pub lockout: Duration,
}

/// Tunables of the scoring engine and the round clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GameSettings {
    /// Countdown length of a question.
    #[validate(range(min = 5, max = 240))]
    pub seconds_per_question: u32,
    /// Default base points when a question does not carry its own value.
    pub points_correct: u32,
    /// Extra points for a correct first committer (racing).
    pub first_bonus: u32,
    /// Points lost by a wrong first committer (racing), clamped at zero.
    pub first_penalty: u32,
    /// Multiply earned points by the running streak.
    pub streak_multiplier: bool,
    /// Upper bound of the streak multiplier.
    #[validate(range(min = 1))]
    pub max_streak_multiplier: u32,
    /// Largest speed bonus an instant answer can earn (open speed policy).
    pub speed_bonus_max: u32,
    /// Scoring policy of the deployment.
    pub policy: ScoringPolicy,
    /// Extra rules applied when `policy` is racing.
    pub racing: RacingRules,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            seconds_per_question: 30,
            points_correct: 100,
            first_bonus: 50,
            first_penalty: 50,
            streak_multiplier: true,
            max_streak_multiplier: 5,
            speed_bonus_max: 100,
            policy: ScoringPolicy::Racing,
            racing: RacingRules::default(),
        }
    }
}

impl GameSettings {
    /// Total answer window of a round.
    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.seconds_per_question))
    }

    /// Multiplier applied for a player whose streak before this round is `streak`.
    pub fn streak_factor(&self, streak: u32) -> u32 {
        if self.streak_multiplier {
            streak.saturating_add(1).min(self.max_streak_multiplier.max(1))
        } else {
            1
        }
    }
}
