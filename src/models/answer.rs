// src/models/answer.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::{error::AppError, models::question::OptionLabel};

/// A participant's response to one question of an attempt.
/// At most one exists per (attempt, question).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_label: Option<OptionLabel>,
    /// Graded when written, never supplied by the participant.
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Raw `answers` row.
#[derive(Debug, FromRow)]
pub struct AnswerRow {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_label: Option<String>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = AppError;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        let selected_label = row
            .selected_label
            .as_deref()
            .map(str::parse::<OptionLabel>)
            .transpose()
            .map_err(|_| {
                AppError::InternalServerError(format!("Answer {} has a corrupt label", row.id))
            })?;

        Ok(Answer {
            id: row.id,
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            selected_label,
            is_correct: row.is_correct,
            answered_at: row.answered_at,
        })
    }
}

/// Upsert payload keyed by (attempt_id, question_id).
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerUpsert {
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_label: Option<OptionLabel>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}
