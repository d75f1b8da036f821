// src/exam/mod.rs

//! The exam engine: attempt lifecycle, grading and per-quiz statistics.
//!
//! Storage and time are injected, so the same engine runs against Postgres
//! in production and against the in-memory store in tests.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    error::AppError,
    models::{attempt::Attempt, quiz::{Quiz, QuizMeta}},
    storage::{AttemptStore, QuestionBank},
};

pub mod authoring;
pub mod clock;
pub mod scoring;
pub mod session;
pub mod statistics;

pub use clock::{Clock, SystemClock};
pub use scoring::ScoreReport;
pub use statistics::{QuizStatistics, ScoreDistribution};

#[derive(Clone)]
pub struct ExamService {
    bank: Arc<dyn QuestionBank>,
    attempts: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl ExamService {
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        attempts: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bank,
            attempts,
            clock,
        }
    }

    async fn require_quiz(&self, quiz_id: i64) -> Result<Quiz, AppError> {
        self.bank
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
    }

    async fn require_meta(&self, quiz_id: i64) -> Result<QuizMeta, AppError> {
        self.bank
            .quiz_meta(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
    }
}

/// The instant an attempt runs out of time: the end of its duration budget
/// or the quiz deadline, whichever comes first.
pub fn expires_at(attempt: &Attempt, meta: &QuizMeta) -> DateTime<Utc> {
    let budget_end = TimeDelta::try_minutes(meta.duration_minutes)
        .and_then(|budget| attempt.started_at.checked_add_signed(budget))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    match meta.deadline {
        Some(deadline) if deadline < budget_end => deadline,
        _ => budget_end,
    }
}

pub fn is_expired(attempt: &Attempt, meta: &QuizMeta, now: DateTime<Utc>) -> bool {
    now > expires_at(attempt, meta)
}

pub fn remaining_seconds(attempt: &Attempt, meta: &QuizMeta, now: DateTime<Utc>) -> i64 {
    (expires_at(attempt, meta) - now).num_seconds().max(0)
}
