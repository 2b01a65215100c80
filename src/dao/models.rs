use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::state::game::{AnswerColor, AnswerOptions, Question};

/// Quiz file as written by quiz authors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizEntity {
    /// Title shown on the attract screen.
    #[validate(length(min = 1))]
    pub quiz_title: String,
    /// Questions in authoring order.
    #[validate(length(min = 1), nested)]
    pub questions: Vec<QuestionEntity>,
}

/// One question entry of a quiz file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct QuestionEntity {
    pub id: u32,
    /// Prompt text.
    #[validate(length(min = 1))]
    pub question: String,
    #[validate(nested)]
    pub answers: AnswersEntity,
    /// Colour of the correct answer.
    pub correct: AnswerColor,
    /// Points for a correct answer, configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

/// Answer texts keyed by button colour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct AnswersEntity {
    #[validate(length(min = 1))]
    pub blue: String,
    #[validate(length(min = 1))]
    pub orange: String,
    #[validate(length(min = 1))]
    pub green: String,
    #[validate(length(min = 1))]
    pub yellow: String,
}

impl From<QuestionEntity> for Question {
    fn from(entity: QuestionEntity) -> Self {
        Question {
            id: entity.id,
            prompt: entity.question,
            answers: AnswerOptions {
                blue: entity.answers.blue,
                orange: entity.answers.orange,
                green: entity.answers.green,
                yellow: entity.answers.yellow,
            },
            correct: entity.correct,
            points: entity.points,
        }
    }
}

/// Durable best score, keyed by a fixed identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HighScoreEntity {
    /// Record identifier.
    pub key: String,
    /// Best winning score ever observed.
    pub score: u32,
    /// Last time the record was written, RFC 3339.
    pub updated_at: String,
}
