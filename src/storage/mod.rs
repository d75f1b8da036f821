// src/storage/mod.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        answer::{Answer, AnswerUpsert},
        attempt::{Attempt, Finalization},
        question::{CreateQuestionRequest, OptionLabel, PublicQuestion, Question},
        quiz::{CreateQuizRequest, Quiz, QuizMeta},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Map of question id to its correct label.
pub type AnswerKey = HashMap<i64, OptionLabel>;

/// Quiz and question source. Read-only from the exam engine's point of view;
/// the authoring methods back the admin endpoints.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn quiz_meta(&self, quiz_id: i64) -> Result<Option<QuizMeta>, AppError>;

    /// Questions without their answer key, in display order.
    async fn list_questions_for_attempt(&self, quiz_id: i64)
    -> Result<Vec<PublicQuestion>, AppError>;

    async fn correct_answer_key(&self, quiz_id: i64) -> Result<AnswerKey, AppError>;

    /// Full questions in display order, answer key included.
    async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError>;

    async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError>;

    async fn list_quizzes(&self, published_only: bool) -> Result<Vec<Quiz>, AppError>;

    async fn create_quiz(
        &self,
        req: &CreateQuizRequest,
        created_at: DateTime<Utc>,
    ) -> Result<Quiz, AppError>;

    async fn add_question(
        &self,
        quiz_id: i64,
        req: &CreateQuestionRequest,
    ) -> Result<Question, AppError>;

    /// Returns `false` when the quiz does not exist.
    async fn set_published(&self, quiz_id: i64, published: bool) -> Result<bool, AppError>;
}

/// Persistence for attempts and their answers.
///
/// Implementations must make `insert_or_get_attempt`, `upsert_answer` and
/// `finalize_attempt` atomic: they are what keeps concurrent starts, late
/// answers and submit/expire races from breaking the one-attempt rule.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Creates an `in_progress` attempt for the pair, or returns the row that
    /// already exists. The flag is `true` when this call created it.
    async fn insert_or_get_attempt(
        &self,
        quiz_id: i64,
        participant_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(Attempt, bool), AppError>;

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError>;

    async fn find_attempt_for(
        &self,
        participant_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    /// Inserts or replaces the answer for (attempt, question), but only while
    /// the attempt is still `in_progress`. `None` means the attempt was closed.
    async fn upsert_answer(&self, answer: &AnswerUpsert) -> Result<Option<Answer>, AppError>;

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError>;

    /// Compare-and-set away from `in_progress`, scoring the stored answers
    /// against `key` in the same atomic step. No answer can land between the
    /// read that is scored and the status flip. `None` means another caller
    /// already finalized the attempt and nothing was written.
    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        outcome: &Finalization,
        key: &AnswerKey,
    ) -> Result<Option<Attempt>, AppError>;

    /// Attempts in `completed` or `timeout` state for a quiz.
    async fn list_terminal_attempts(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError>;

    async fn list_attempts_by_quiz(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError>;

    async fn list_attempts_by_participant(
        &self,
        participant_id: i64,
    ) -> Result<Vec<Attempt>, AppError>;

    async fn list_all_attempts(&self) -> Result<Vec<Attempt>, AppError>;

    async fn list_in_progress(&self) -> Result<Vec<Attempt>, AppError>;
}
