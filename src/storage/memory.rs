// src/storage/memory.rs

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AnswerKey, AttemptStore, QuestionBank};
use crate::{
    config::DEFAULT_DURATION_MINUTES,
    error::AppError,
    exam::scoring,
    models::{
        answer::{Answer, AnswerUpsert},
        attempt::{Attempt, AttemptStatus, Finalization},
        question::{CreateQuestionRequest, PublicQuestion, Question},
        quiz::{CreateQuizRequest, Quiz, QuizMeta},
    },
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    quizzes: HashMap<i64, Quiz>,
    questions: HashMap<i64, Question>,
    attempts: HashMap<i64, Attempt>,
    /// Unique (participant_id, quiz_id) index over all attempts.
    attempt_index: HashMap<(i64, i64), i64>,
    /// Answers keyed by (attempt_id, question_id).
    answers: HashMap<(i64, i64), Answer>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn sorted_questions(&self, quiz_id: i64) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.question_order, q.id));
        questions
    }

    fn attempts_where(&self, pred: impl Fn(&Attempt) -> bool) -> Vec<Attempt> {
        let mut attempts: Vec<Attempt> =
            self.attempts.values().filter(|a| pred(a)).cloned().collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        attempts
    }
}

/// Mutex-guarded store. Each trait call holds the lock for its whole
/// read-modify-write, which gives the same atomicity as the SQL backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Persistence("In-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl QuestionBank for MemoryStore {
    async fn quiz_meta(&self, quiz_id: i64) -> Result<Option<QuizMeta>, AppError> {
        Ok(self.lock()?.quizzes.get(&quiz_id).map(QuizMeta::from))
    }

    async fn list_questions_for_attempt(
        &self,
        quiz_id: i64,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        Ok(self
            .lock()?
            .sorted_questions(quiz_id)
            .into_iter()
            .map(PublicQuestion::from)
            .collect())
    }

    async fn correct_answer_key(&self, quiz_id: i64) -> Result<AnswerKey, AppError> {
        Ok(self
            .lock()?
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .map(|q| (q.id, q.correct_label))
            .collect())
    }

    async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.lock()?.sorted_questions(quiz_id))
    }

    async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.lock()?.quizzes.get(&quiz_id).cloned())
    }

    async fn list_quizzes(&self, published_only: bool) -> Result<Vec<Quiz>, AppError> {
        let inner = self.lock()?;
        let mut quizzes: Vec<Quiz> = inner
            .quizzes
            .values()
            .filter(|q| !published_only || q.published)
            .cloned()
            .collect();
        quizzes.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(quizzes)
    }

    async fn create_quiz(
        &self,
        req: &CreateQuizRequest,
        created_at: DateTime<Utc>,
    ) -> Result<Quiz, AppError> {
        let mut inner = self.lock()?;
        let id = inner.next_id();
        let quiz = Quiz {
            id,
            title: req.title.clone(),
            description: req.description.clone(),
            duration_minutes: req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            deadline: req.deadline,
            published: false,
            created_at,
        };
        inner.quizzes.insert(id, quiz.clone());
        Ok(quiz)
    }

    async fn add_question(
        &self,
        quiz_id: i64,
        req: &CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        let mut inner = self.lock()?;
        if !inner.quizzes.contains_key(&quiz_id) {
            return Err(AppError::NotFound(format!("Quiz {} not found", quiz_id)));
        }

        let question_order = match req.question_order {
            Some(order) => order,
            None => inner
                .questions
                .values()
                .filter(|q| q.quiz_id == quiz_id)
                .map(|q| q.question_order)
                .max()
                .map_or(1, |max| max + 1),
        };

        let id = inner.next_id();
        let question = Question {
            id,
            quiz_id,
            question_text: req.question_text.clone(),
            option_a: req.option_a.clone(),
            option_b: req.option_b.clone(),
            option_c: req.option_c.clone(),
            option_d: req.option_d.clone(),
            correct_label: req.correct_label,
            question_order,
        };
        inner.questions.insert(id, question.clone());
        Ok(question)
    }

    async fn set_published(&self, quiz_id: i64, published: bool) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner.quizzes.get_mut(&quiz_id) {
            Some(quiz) => {
                quiz.published = published;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn insert_or_get_attempt(
        &self,
        quiz_id: i64,
        participant_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(Attempt, bool), AppError> {
        let mut inner = self.lock()?;

        if let Some(existing_id) = inner.attempt_index.get(&(participant_id, quiz_id)) {
            let existing = inner
                .attempts
                .get(existing_id)
                .cloned()
                .ok_or_else(|| AppError::Persistence("Attempt index out of sync".to_string()))?;
            return Ok((existing, false));
        }

        let id = inner.next_id();
        let attempt = Attempt {
            id,
            quiz_id,
            participant_id,
            status: AttemptStatus::InProgress,
            started_at,
            submitted_at: None,
            time_spent: None,
            total_questions: 0,
            correct_answers: 0,
            score: 0.0,
        };
        inner.attempts.insert(id, attempt.clone());
        inner.attempt_index.insert((participant_id, quiz_id), id);
        Ok((attempt, true))
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.lock()?.attempts.get(&attempt_id).cloned())
    }

    async fn find_attempt_for(
        &self,
        participant_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .attempt_index
            .get(&(participant_id, quiz_id))
            .and_then(|id| inner.attempts.get(id))
            .cloned())
    }

    async fn upsert_answer(&self, answer: &AnswerUpsert) -> Result<Option<Answer>, AppError> {
        let mut inner = self.lock()?;

        let open = inner
            .attempts
            .get(&answer.attempt_id)
            .is_some_and(|a| a.status == AttemptStatus::InProgress);
        if !open {
            return Ok(None);
        }

        let key = (answer.attempt_id, answer.question_id);
        let existing_id = inner.answers.get(&key).map(|a| a.id);
        let id = match existing_id {
            Some(id) => id,
            None => inner.next_id(),
        };
        let stored = Answer {
            id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            selected_label: answer.selected_label,
            is_correct: answer.is_correct,
            answered_at: answer.answered_at,
        };
        inner.answers.insert(key, stored.clone());
        Ok(Some(stored))
    }

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
        let inner = self.lock()?;
        let mut answers: Vec<Answer> = inner
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.id);
        Ok(answers)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        outcome: &Finalization,
        key: &AnswerKey,
    ) -> Result<Option<Attempt>, AppError> {
        let mut inner = self.lock()?;
        let attempt = match inner.attempts.get(&attempt_id) {
            Some(attempt) if attempt.status == AttemptStatus::InProgress => attempt.clone(),
            _ => return Ok(None),
        };

        // Scored under the same lock that upsert_answer takes.
        let answers: Vec<Answer> = inner
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        let finished = scoring::finalized(&attempt, outcome, key, &answers);

        inner.attempts.insert(attempt_id, finished.clone());
        Ok(Some(finished))
    }

    async fn list_terminal_attempts(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
        Ok(self
            .lock()?
            .attempts_where(|a| a.quiz_id == quiz_id && a.status.is_terminal()))
    }

    async fn list_attempts_by_quiz(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
        Ok(self.lock()?.attempts_where(|a| a.quiz_id == quiz_id))
    }

    async fn list_attempts_by_participant(
        &self,
        participant_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        Ok(self
            .lock()?
            .attempts_where(|a| a.participant_id == participant_id))
    }

    async fn list_all_attempts(&self) -> Result<Vec<Attempt>, AppError> {
        Ok(self.lock()?.attempts_where(|_| true))
    }

    async fn list_in_progress(&self) -> Result<Vec<Attempt>, AppError> {
        Ok(self
            .lock()?
            .attempts_where(|a| a.status == AttemptStatus::InProgress))
    }
}
