// src/exam/authoring.rs

//! Admin-side operations: maintaining the question bank and listing attempts.

use validator::Validate;

use super::ExamService;
use crate::{
    error::AppError,
    models::{
        attempt::Attempt,
        question::{CreateQuestionRequest, Question},
        quiz::{CreateQuizRequest, Quiz, QuizOverview},
    },
    utils::html::clean_html,
};

impl ExamService {
    /// Creates an unpublished quiz.
    pub async fn create_quiz(&self, req: CreateQuizRequest) -> Result<Quiz, AppError> {
        req.validate()?;

        let sanitized = CreateQuizRequest {
            title: clean_html(&req.title),
            description: req.description.as_deref().map(clean_html),
            ..req
        };
        let quiz = self.bank.create_quiz(&sanitized, self.clock.now()).await?;

        tracing::info!("Quiz {} created: {}", quiz.id, quiz.title);
        Ok(quiz)
    }

    /// Appends a question. Published quizzes are frozen so that no running
    /// attempt sees its questions change.
    pub async fn add_question(
        &self,
        quiz_id: i64,
        req: CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        req.validate()?;

        let quiz = self.require_quiz(quiz_id).await?;
        if quiz.published {
            return Err(AppError::InvariantViolation(format!(
                "Quiz {} is published, unpublish it before editing questions",
                quiz_id
            )));
        }

        // Unpublishing does not close running attempts; their question set stays fixed.
        let open: Vec<Attempt> = self
            .attempts
            .list_in_progress()
            .await?
            .into_iter()
            .filter(|a| a.quiz_id == quiz_id)
            .collect();
        let open = self.refresh_all(open).await?;
        if open.iter().any(|a| !a.status.is_terminal()) {
            return Err(AppError::InvariantViolation(format!(
                "Quiz {} has attempts in progress, questions cannot change until they finish",
                quiz_id
            )));
        }

        let sanitized = CreateQuestionRequest {
            question_text: clean_html(&req.question_text),
            option_a: clean_html(&req.option_a),
            option_b: clean_html(&req.option_b),
            option_c: clean_html(&req.option_c),
            option_d: clean_html(&req.option_d),
            ..req
        };
        self.bank.add_question(quiz_id, &sanitized).await
    }

    pub async fn set_published(&self, quiz_id: i64, published: bool) -> Result<Quiz, AppError> {
        if !self.bank.set_published(quiz_id, published).await? {
            return Err(AppError::NotFound(format!("Quiz {} not found", quiz_id)));
        }
        tracing::info!("Quiz {} published = {}", quiz_id, published);
        self.require_quiz(quiz_id).await
    }

    /// Quizzes participants can see.
    pub async fn list_open_quizzes(&self) -> Result<Vec<Quiz>, AppError> {
        self.bank.list_quizzes(true).await
    }

    /// Every quiz with its question and finished-attempt counts.
    pub async fn list_quiz_overviews(&self) -> Result<Vec<QuizOverview>, AppError> {
        let quizzes = self.bank.list_quizzes(false).await?;
        let mut overviews = Vec::with_capacity(quizzes.len());

        for quiz in quizzes {
            let question_count = self.bank.list_questions(quiz.id).await?.len();
            let completed_attempts = self.count_completed(quiz.id).await?;
            overviews.push(QuizOverview {
                quiz,
                question_count,
                completed_attempts,
            });
        }

        Ok(overviews)
    }

    /// Number of attempts that reached `completed` or `timeout`.
    pub async fn count_completed(&self, quiz_id: i64) -> Result<usize, AppError> {
        Ok(self.attempts.list_terminal_attempts(quiz_id).await?.len())
    }

    /// A participant's history, most recent first.
    pub async fn list_participant_attempts(
        &self,
        participant_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let attempts = self
            .attempts
            .list_attempts_by_participant(participant_id)
            .await?;
        self.refresh_all(attempts).await
    }

    pub async fn list_quiz_attempts(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
        self.require_quiz(quiz_id).await?;
        let attempts = self.attempts.list_attempts_by_quiz(quiz_id).await?;
        self.refresh_all(attempts).await
    }

    pub async fn list_all_attempts(&self) -> Result<Vec<Attempt>, AppError> {
        let attempts = self.attempts.list_all_attempts().await?;
        self.refresh_all(attempts).await
    }
}
