// src/storage/postgres.rs

use std::{fmt::Debug, future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AnswerKey, AttemptStore, QuestionBank};
use crate::{
    config::DEFAULT_DURATION_MINUTES,
    error::AppError,
    exam::scoring,
    models::{
        answer::{Answer, AnswerRow, AnswerUpsert},
        attempt::{Attempt, AttemptRow, AttemptStatus, Finalization},
        question::{CreateQuestionRequest, OptionLabel, PublicQuestion, Question, QuestionRow},
        quiz::{CreateQuizRequest, Quiz, QuizMeta},
    },
};

const ATTEMPT_COLUMNS: &str = "id, quiz_id, participant_id, status, started_at, submitted_at, \
     time_spent, total_questions, correct_answers, score";

const ANSWER_COLUMNS: &str =
    "id, attempt_id, question_id, selected_label, is_correct, answered_at";

const QUIZ_COLUMNS: &str =
    "id, title, description, duration_minutes, deadline, published, created_at";

/// Postgres-backed question bank and attempt store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Runs a query under the configured deadline so a stalled database
    /// surfaces as a persistence failure instead of a hung request.
    async fn bounded<T, E, F>(&self, action: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Into<AppError> + Debug,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("Failed to {}: {:?}", action, e);
                Err(e.into())
            }
            Err(_) => {
                tracing::error!("Timed out trying to {}", action);
                Err(AppError::Persistence(format!(
                    "Timed out after {:?} trying to {}",
                    self.timeout, action
                )))
            }
        }
    }

    async fn attempts_where(
        &self,
        action: &str,
        clause: &str,
        bind: Option<i64>,
    ) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            "SELECT {} FROM attempts {} ORDER BY started_at DESC, id DESC",
            ATTEMPT_COLUMNS, clause
        );
        let mut query = sqlx::query_as::<_, AttemptRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        self.bounded(action, query.fetch_all(&self.pool))
            .await?
            .into_iter()
            .map(Attempt::try_from)
            .collect()
    }

    /// Locks the attempt row `FOR SHARE` so a concurrent finalize (which
    /// takes `FOR UPDATE`) waits for this answer, or this answer sees the
    /// finished status.
    async fn upsert_answer_tx(&self, answer: &AnswerUpsert) -> Result<Option<Answer>, AppError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM attempts WHERE id = $1 FOR SHARE")
                .bind(answer.attempt_id)
                .fetch_optional(&mut *tx)
                .await?;
        if status.as_deref() != Some(AttemptStatus::InProgress.as_str()) {
            return Ok(None);
        }

        let sql = format!(
            r#"
            INSERT INTO answers (attempt_id, question_id, selected_label, is_correct, answered_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                selected_label = EXCLUDED.selected_label,
                is_correct = EXCLUDED.is_correct,
                answered_at = EXCLUDED.answered_at
            RETURNING {}
            "#,
            ANSWER_COLUMNS
        );
        let row = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(answer.attempt_id)
            .bind(answer.question_id)
            .bind(answer.selected_label.map(|l| l.as_str()))
            .bind(answer.is_correct)
            .bind(answer.answered_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Answer::try_from(row).map(Some)
    }

    /// Takes the attempt row `FOR UPDATE`, scores the answers read under that
    /// lock and writes the terminal state in one transaction.
    async fn finalize_tx(
        &self,
        attempt_id: i64,
        outcome: &Finalization,
        key: &AnswerKey,
    ) -> Result<Option<Attempt>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM attempts WHERE id = $1 FOR UPDATE",
            ATTEMPT_COLUMNS
        );
        let attempt = match sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt_id)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => Attempt::try_from(row)?,
            None => return Ok(None),
        };
        if attempt.status != AttemptStatus::InProgress {
            // Dropping the transaction rolls it back and releases the lock.
            return Ok(None);
        }

        let sql = format!(
            "SELECT {} FROM answers WHERE attempt_id = $1 ORDER BY id",
            ANSWER_COLUMNS
        );
        let answers = sqlx::query_as::<_, AnswerRow>(&sql)
            .bind(attempt_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(Answer::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let finished = scoring::finalized(&attempt, outcome, key, &answers);

        sqlx::query(
            r#"
            UPDATE attempts SET
                status = $2,
                submitted_at = $3,
                time_spent = $4,
                total_questions = $5,
                correct_answers = $6,
                score = $7
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(attempt_id)
        .bind(finished.status.as_str())
        .bind(finished.submitted_at)
        .bind(finished.time_spent)
        .bind(finished.total_questions)
        .bind(finished.correct_answers)
        .bind(finished.score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(finished))
    }
}

#[async_trait]
impl QuestionBank for PgStore {
    async fn quiz_meta(&self, quiz_id: i64) -> Result<Option<QuizMeta>, AppError> {
        Ok(self.get_quiz(quiz_id).await?.as_ref().map(QuizMeta::from))
    }

    async fn list_questions_for_attempt(
        &self,
        quiz_id: i64,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        let query = sqlx::query_as::<_, PublicQuestion>(
            r#"
            SELECT id, question_text, option_a, option_b, option_c, option_d
            FROM questions
            WHERE quiz_id = $1
            ORDER BY question_order, id
            "#,
        )
        .bind(quiz_id);

        self.bounded("fetch attempt questions", query.fetch_all(&self.pool))
            .await
    }

    async fn correct_answer_key(&self, quiz_id: i64) -> Result<AnswerKey, AppError> {
        let query = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, correct_label FROM questions WHERE quiz_id = $1",
        )
        .bind(quiz_id);

        let rows = self
            .bounded("fetch answer key", query.fetch_all(&self.pool))
            .await?;

        rows.into_iter()
            .map(|(id, label)| {
                let label = label.parse::<OptionLabel>().map_err(|_| {
                    AppError::InternalServerError(format!(
                        "Question {} has corrupt answer key '{}'",
                        id, label
                    ))
                })?;
                Ok::<_, AppError>((id, label))
            })
            .collect()
    }

    async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let query = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, quiz_id, question_text, option_a, option_b, option_c, option_d,
                   correct_label, question_order
            FROM questions
            WHERE quiz_id = $1
            ORDER BY question_order, id
            "#,
        )
        .bind(quiz_id);

        self.bounded("fetch questions", query.fetch_all(&self.pool))
            .await?
            .into_iter()
            .map(Question::try_from)
            .collect()
    }

    async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        let sql = format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS);
        let query = sqlx::query_as::<_, Quiz>(&sql).bind(quiz_id);

        self.bounded("fetch quiz", query.fetch_optional(&self.pool))
            .await
    }

    async fn list_quizzes(&self, published_only: bool) -> Result<Vec<Quiz>, AppError> {
        let sql = format!(
            "SELECT {} FROM quizzes WHERE published OR NOT $1 ORDER BY id DESC",
            QUIZ_COLUMNS
        );
        let query = sqlx::query_as::<_, Quiz>(&sql).bind(published_only);

        self.bounded("list quizzes", query.fetch_all(&self.pool))
            .await
    }

    async fn create_quiz(
        &self,
        req: &CreateQuizRequest,
        created_at: DateTime<Utc>,
    ) -> Result<Quiz, AppError> {
        let sql = format!(
            r#"
            INSERT INTO quizzes (title, description, duration_minutes, deadline, published, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING {}
            "#,
            QUIZ_COLUMNS
        );
        let query = sqlx::query_as::<_, Quiz>(&sql)
            .bind(&req.title)
            .bind(&req.description)
            .bind(req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES))
            .bind(req.deadline)
            .bind(created_at);

        self.bounded("create quiz", query.fetch_one(&self.pool))
            .await
    }

    async fn add_question(
        &self,
        quiz_id: i64,
        req: &CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        let query = sqlx::query_as::<_, QuestionRow>(
            r#"
            INSERT INTO questions
                (quiz_id, question_text, option_a, option_b, option_c, option_d,
                 correct_label, question_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7,
                COALESCE($8, (SELECT COALESCE(MAX(question_order), 0) + 1
                              FROM questions WHERE quiz_id = $1)))
            RETURNING id, quiz_id, question_text, option_a, option_b, option_c, option_d,
                      correct_label, question_order
            "#,
        )
        .bind(quiz_id)
        .bind(&req.question_text)
        .bind(&req.option_a)
        .bind(&req.option_b)
        .bind(&req.option_c)
        .bind(&req.option_d)
        .bind(req.correct_label.as_str())
        .bind(req.question_order);

        self.bounded("add question", query.fetch_one(&self.pool))
            .await?
            .try_into()
    }

    async fn set_published(&self, quiz_id: i64, published: bool) -> Result<bool, AppError> {
        let query = sqlx::query("UPDATE quizzes SET published = $2 WHERE id = $1")
            .bind(quiz_id)
            .bind(published);

        let result = self
            .bounded("update quiz visibility", query.execute(&self.pool))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn insert_or_get_attempt(
        &self,
        quiz_id: i64,
        participant_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(Attempt, bool), AppError> {
        // The unique (participant_id, quiz_id) constraint decides concurrent starts:
        // the loser inserts nothing and reads the winner's row below.
        let sql = format!(
            r#"
            INSERT INTO attempts
                (quiz_id, participant_id, status, started_at, total_questions, correct_answers, score)
            VALUES ($1, $2, $3, $4, 0, 0, 0)
            ON CONFLICT (participant_id, quiz_id) DO NOTHING
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        );
        let query = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(quiz_id)
            .bind(participant_id)
            .bind(AttemptStatus::InProgress.as_str())
            .bind(started_at);

        if let Some(row) = self
            .bounded("create attempt", query.fetch_optional(&self.pool))
            .await?
        {
            return Ok((row.try_into()?, true));
        }

        let existing = self
            .find_attempt_for(participant_id, quiz_id)
            .await?
            .ok_or_else(|| {
                AppError::Persistence("Attempt vanished after a conflicting insert".to_string())
            })?;
        Ok((existing, false))
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        let sql = format!("SELECT {} FROM attempts WHERE id = $1", ATTEMPT_COLUMNS);
        let query = sqlx::query_as::<_, AttemptRow>(&sql).bind(attempt_id);

        self.bounded("fetch attempt", query.fetch_optional(&self.pool))
            .await?
            .map(Attempt::try_from)
            .transpose()
    }

    async fn find_attempt_for(
        &self,
        participant_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            "SELECT {} FROM attempts WHERE participant_id = $1 AND quiz_id = $2",
            ATTEMPT_COLUMNS
        );
        let query = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(participant_id)
            .bind(quiz_id);

        self.bounded("fetch participant attempt", query.fetch_optional(&self.pool))
            .await?
            .map(Attempt::try_from)
            .transpose()
    }

    async fn upsert_answer(&self, answer: &AnswerUpsert) -> Result<Option<Answer>, AppError> {
        // Writes only land while the attempt is open; a concurrent finalize wins.
        self.bounded("upsert answer", self.upsert_answer_tx(answer))
            .await
    }

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        let query = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT id, attempt_id, question_id, selected_label, is_correct, answered_at
            FROM answers
            WHERE attempt_id = $1
            ORDER BY id
            "#,
        )
        .bind(attempt_id);

        self.bounded("fetch answers", query.fetch_all(&self.pool))
            .await?
            .into_iter()
            .map(Answer::try_from)
            .collect()
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        outcome: &Finalization,
        key: &AnswerKey,
    ) -> Result<Option<Attempt>, AppError> {
        self.bounded("finalize attempt", self.finalize_tx(attempt_id, outcome, key))
            .await
    }

    async fn list_terminal_attempts(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
        self.attempts_where(
            "fetch finished attempts",
            "WHERE quiz_id = $1 AND status IN ('completed', 'timeout')",
            Some(quiz_id),
        )
        .await
    }

    async fn list_attempts_by_quiz(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
        self.attempts_where("list quiz attempts", "WHERE quiz_id = $1", Some(quiz_id))
            .await
    }

    async fn list_attempts_by_participant(
        &self,
        participant_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        self.attempts_where(
            "list participant attempts",
            "WHERE participant_id = $1",
            Some(participant_id),
        )
        .await
    }

    async fn list_all_attempts(&self) -> Result<Vec<Attempt>, AppError> {
        self.attempts_where("list attempts", "", None).await
    }

    async fn list_in_progress(&self) -> Result<Vec<Attempt>, AppError> {
        self.attempts_where(
            "list open attempts",
            "WHERE status = 'in_progress'",
            None,
        )
        .await
    }
}
