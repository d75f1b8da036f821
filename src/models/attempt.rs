// src/models/attempt.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::AppError,
    models::question::{OptionLabel, PublicQuestion},
};

/// Lifecycle state of an attempt. `Completed` and `Timeout` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Timeout,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl FromStr for AttemptStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "timeout" => Ok(AttemptStatus::Timeout),
            other => Err(AppError::InternalServerError(format!(
                "Unknown attempt status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant's single pass at a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub quiz_id: i64,
    pub participant_id: i64,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_spent: Option<i64>,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub score: f64,
}

impl Attempt {
    /// Time spent rendered as `MM:SS`, `N/A` until the attempt is finished.
    pub fn formatted_time_spent(&self) -> String {
        match self.time_spent {
            Some(secs) => format!("{:02}:{:02}", secs / 60, secs % 60),
            None => "N/A".to_string(),
        }
    }
}

/// Raw `attempts` row.
#[derive(Debug, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub quiz_id: i64,
    pub participant_id: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_spent: Option<i64>,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub score: f64,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            quiz_id: row.quiz_id,
            participant_id: row.participant_id,
            status: row.status.parse::<AttemptStatus>()?,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            time_spent: row.time_spent,
            total_questions: row.total_questions,
            correct_answers: row.correct_answers,
            score: row.score,
        })
    }
}

/// Request to leave `in_progress`. The store scores the attempt in the same
/// atomic step that checks and flips its status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Finalization {
    pub status: AttemptStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Who is asking. Participants only see their own attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Participant(i64),
    Admin,
}

impl Actor {
    pub fn can_read(&self, attempt: &Attempt) -> bool {
        match self {
            Actor::Admin => true,
            Actor::Participant(id) => *id == attempt.participant_id,
        }
    }
}

/// Returned by `start`: the attempt and its shuffled, key-less question list.
#[derive(Debug, Serialize)]
pub struct StartedAttempt {
    pub attempt: Attempt,
    pub questions: Vec<PublicQuestion>,
    /// `false` when an existing in-progress attempt was resumed.
    pub created: bool,
    pub remaining_seconds: i64,
}

/// Status report for an attempt after lazy expiry has been applied.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub attempt: Attempt,
    pub remaining_seconds: Option<i64>,
    pub time_spent_display: String,
}

/// One line of a finished attempt's review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewItem {
    pub question_id: i64,
    pub question_text: String,
    pub selected_label: Option<OptionLabel>,
    pub correct_label: OptionLabel,
    pub is_correct: bool,
}

#[derive(Debug, Serialize)]
pub struct AttemptReview {
    pub attempt: Attempt,
    pub items: Vec<ReviewItem>,
}

/// DTO for recording (or clearing) an answer.
#[derive(Debug, Deserialize)]
pub struct RecordAnswerRequest {
    pub question_id: i64,
    /// `A`..`D`; null or blank clears the response.
    pub selected: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [
            AttemptStatus::InProgress,
            AttemptStatus::Completed,
            AttemptStatus::Timeout,
        ] {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
        assert!(!AttemptStatus::InProgress.is_terminal());
        assert!(AttemptStatus::Timeout.is_terminal());
    }

    #[test]
    fn time_spent_is_formatted_as_minutes_and_seconds() {
        let mut attempt = Attempt {
            id: 1,
            quiz_id: 1,
            participant_id: 1,
            status: AttemptStatus::InProgress,
            started_at: Utc::now(),
            submitted_at: None,
            time_spent: None,
            total_questions: 0,
            correct_answers: 0,
            score: 0.0,
        };
        assert_eq!(attempt.formatted_time_spent(), "N/A");

        attempt.time_spent = Some(125);
        assert_eq!(attempt.formatted_time_spent(), "02:05");
    }
}
