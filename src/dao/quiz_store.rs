//! Quiz content: the provider contract the session reads questions through,
//! the in-memory deck implementing it, and the JSON loader with its built-in
//! fallback deck.

use std::{fs, io, path::Path};

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::QuizEntity,
    state::game::{AnswerColor, AnswerOptions, Question},
};

/// Title of the deck used when no quiz could be loaded.
pub const FALLBACK_QUIZ_TITLE: &str = "Retro Arcade Trivia";

/// Position of the cursor within the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizProgress {
    /// Zero-based index of the current question.
    pub index: usize,
    /// Number of questions in the quiz.
    pub total: usize,
}

/// Ordered question source with a cursor, consumed by the session.
pub trait QuizProvider: Send {
    /// Display title of the quiz.
    fn title(&self) -> &str;
    /// Question under the cursor.
    fn current(&self) -> Option<&Question>;
    /// Move the cursor forward and return the new current question.
    fn advance(&mut self) -> Option<&Question>;
    /// Whether [`QuizProvider::advance`] would yield a question.
    fn has_more(&self) -> bool;
    /// Put the cursor back on the first question.
    fn rewind(&mut self);
    fn progress(&self) -> QuizProgress;
}

/// Errors raised while reading quiz content.
#[derive(Debug, Error)]
pub enum QuizLoadError {
    #[error("failed to read quiz file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed quiz file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid quiz content: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("quiz has no questions")]
    Empty,
}

/// In-memory quiz with a cursor.
#[derive(Debug, Clone)]
pub struct QuizDeck {
    title: String,
    questions: Vec<Question>,
    cursor: usize,
}

impl QuizDeck {
    /// Build a deck, refusing an empty question list.
    pub fn new(title: impl Into<String>, questions: Vec<Question>) -> Result<Self, QuizLoadError> {
        if questions.is_empty() {
            return Err(QuizLoadError::Empty);
        }
        Ok(Self {
            title: title.into(),
            questions,
            cursor: 0,
        })
    }

    /// Parse and validate the JSON quiz format.
    pub fn from_json(raw: &str) -> Result<Self, QuizLoadError> {
        let entity: QuizEntity = serde_json::from_str(raw)?;
        if entity.questions.is_empty() {
            return Err(QuizLoadError::Empty);
        }
        entity.validate()?;
        let questions = entity.questions.into_iter().map(Question::from).collect();
        Self::new(entity.quiz_title, questions)
    }

    /// Read a quiz file from disk.
    pub fn load(path: &Path) -> Result<Self, QuizLoadError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Single-question deck that keeps the game playable without content.
    pub fn fallback() -> Self {
        Self {
            title: FALLBACK_QUIZ_TITLE.to_string(),
            questions: vec![Question {
                id: 1,
                prompt: "What was the most popular arcade game of 1982?".to_string(),
                answers: AnswerOptions {
                    blue: "Pac-Man".to_string(),
                    orange: "Donkey Kong".to_string(),
                    green: "Space Invaders".to_string(),
                    yellow: "Galaga".to_string(),
                },
                correct: AnswerColor::Blue,
                points: Some(100),
            }],
            cursor: 0,
        }
    }

    /// Load `path`, substituting the fallback deck on any failure.
    pub fn load_or_fallback(path: &Path, shuffle: bool) -> Self {
        let mut deck = match Self::load(path) {
            Ok(deck) => {
                info!(
                    path = %path.display(),
                    title = %deck.title,
                    count = deck.questions.len(),
                    "loaded quiz"
                );
                deck
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load quiz; using built-in questions"
                );
                Self::fallback()
            }
        };
        if shuffle {
            deck.shuffle(&mut rand::rng());
        }
        deck
    }

    /// Shuffle question order and rewind.
    pub fn shuffle<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        self.questions.shuffle(rng);
        self.cursor = 0;
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}

impl QuizProvider for QuizDeck {
    fn title(&self) -> &str {
        &self.title
    }

    fn current(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }

    fn advance(&mut self) -> Option<&Question> {
        if !self.has_more() {
            return None;
        }
        self.cursor += 1;
        self.questions.get(self.cursor)
    }

    fn has_more(&self) -> bool {
        self.cursor + 1 < self.questions.len()
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn progress(&self) -> QuizProgress {
        QuizProgress {
            index: self.cursor,
            total: self.questions.len(),
        }
    }
}
