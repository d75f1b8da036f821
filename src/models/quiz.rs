// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub deadline: Option<DateTime<Utc>>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// The slice of a quiz the exam engine needs to run an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuizMeta {
    pub duration_minutes: i64,
    pub deadline: Option<DateTime<Utc>>,
    pub published: bool,
}

impl QuizMeta {
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }
}

impl From<&Quiz> for QuizMeta {
    fn from(quiz: &Quiz) -> Self {
        QuizMeta {
            duration_minutes: quiz.duration_minutes,
            deadline: quiz.deadline,
            published: quiz.published,
        }
    }
}

/// Quiz listing entry for administrators.
#[derive(Debug, Serialize)]
pub struct QuizOverview {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub question_count: usize,
    pub completed_attempts: usize,
}

/// DTO for creating a quiz. New quizzes start unpublished.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
}

/// DTO for toggling a quiz's visibility.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}
