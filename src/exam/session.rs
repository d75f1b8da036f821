// src/exam/session.rs

//! Attempt state machine: `in_progress` moves exactly once to `completed`
//! (explicit submit) or `timeout` (budget exhausted). Expiry is detected
//! lazily whenever an attempt is touched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{ExamService, is_expired, remaining_seconds, scoring};
use crate::{
    error::AppError,
    models::{
        answer::{Answer, AnswerUpsert},
        attempt::{
            Actor, Attempt, AttemptReview, AttemptStatus, AttemptView, Finalization, ReviewItem,
            StartedAttempt,
        },
        question::{OptionLabel, PublicQuestion},
        quiz::QuizMeta,
    },
};

/// Presentation order for one request. Never persisted and never used for
/// grading, which stays keyed by question id.
pub fn shuffle_questions(mut questions: Vec<PublicQuestion>, seed: u64) -> Vec<PublicQuestion> {
    let mut rng = StdRng::seed_from_u64(seed);
    questions.shuffle(&mut rng);
    questions
}

impl ExamService {
    /// Starts (or resumes) the participant's attempt at a quiz.
    ///
    /// * A finished attempt for the pair blocks a new one.
    /// * An open attempt is returned as-is so page reloads do not fork the attempt.
    /// * New attempts need a published quiz whose deadline has not passed.
    pub async fn start(
        &self,
        participant_id: i64,
        quiz_id: i64,
    ) -> Result<StartedAttempt, AppError> {
        let meta = self.require_meta(quiz_id).await?;

        if let Some(existing) = self
            .attempts
            .find_attempt_for(participant_id, quiz_id)
            .await?
        {
            return self.resume(existing, &meta).await;
        }

        let now = self.clock.now();
        if !meta.published {
            return Err(AppError::InvariantViolation(format!(
                "Quiz {} is not open for attempts",
                quiz_id
            )));
        }
        if meta.is_past_deadline(now) {
            return Err(AppError::InvariantViolation(format!(
                "The deadline for quiz {} has passed",
                quiz_id
            )));
        }

        let (attempt, created) = self
            .attempts
            .insert_or_get_attempt(quiz_id, participant_id, now)
            .await?;

        if !created {
            // Lost a race against a concurrent start for the same pair.
            return self.resume(attempt, &meta).await;
        }

        tracing::info!(
            "Participant {} started attempt {} on quiz {}",
            participant_id,
            attempt.id,
            quiz_id
        );
        self.present(attempt, &meta, true, now).await
    }

    /// Records (or clears, with a blank selection) the answer to one question.
    /// The answer is graded on write; the attempt's score is untouched until it finishes.
    pub async fn record_answer(
        &self,
        participant_id: i64,
        attempt_id: i64,
        question_id: i64,
        selected: Option<&str>,
    ) -> Result<Answer, AppError> {
        let selected_label = OptionLabel::parse_selection(selected)?;

        let attempt = self.owned_attempt(participant_id, attempt_id).await?;
        let attempt = self.refresh(attempt).await?;
        if attempt.status.is_terminal() {
            return Err(AppError::attempt_closed(attempt_id));
        }

        let key = self.bank.correct_answer_key(attempt.quiz_id).await?;
        let correct = key.get(&question_id).copied().ok_or_else(|| {
            AppError::NotFound(format!(
                "Question {} is not part of quiz {}",
                question_id, attempt.quiz_id
            ))
        })?;

        let upsert = AnswerUpsert {
            attempt_id,
            question_id,
            selected_label,
            is_correct: scoring::grade(correct, selected_label),
            answered_at: self.clock.now(),
        };

        self.attempts
            .upsert_answer(&upsert)
            .await?
            .ok_or_else(|| AppError::attempt_closed(attempt_id))
    }

    /// Finishes the attempt as `completed` and stores its score.
    /// Scores are write-once: a second submit fails without re-scoring.
    pub async fn submit(&self, participant_id: i64, attempt_id: i64) -> Result<Attempt, AppError> {
        let attempt = self.owned_attempt(participant_id, attempt_id).await?;
        if attempt.status.is_terminal() {
            return Err(AppError::attempt_closed(attempt_id));
        }

        let attempt = self.refresh(attempt).await?;
        if attempt.status.is_terminal() {
            return Err(AppError::InvariantViolation(format!(
                "Time is up for attempt {}, it was recorded as timed out",
                attempt_id
            )));
        }

        let now = self.clock.now();
        self.finalize(&attempt, AttemptStatus::Completed, now)
            .await?
            .ok_or_else(|| AppError::attempt_closed(attempt_id))
    }

    /// Closes an attempt whose time budget is exhausted as `timeout`, scoring
    /// whatever answers exist.
    pub async fn expire(&self, attempt_id: i64) -> Result<Attempt, AppError> {
        let attempt = self.find_attempt(attempt_id).await?;
        if attempt.status.is_terminal() {
            return Err(AppError::attempt_closed(attempt_id));
        }

        let meta = self.require_meta(attempt.quiz_id).await?;
        let now = self.clock.now();
        if !is_expired(&attempt, &meta, now) {
            return Err(AppError::InvariantViolation(format!(
                "Attempt {} still has time remaining",
                attempt_id
            )));
        }

        self.finalize(&attempt, AttemptStatus::Timeout, now)
            .await?
            .ok_or_else(|| AppError::attempt_closed(attempt_id))
    }

    /// Read-only status query. Still applies a pending expiry first, so the
    /// reported status is never stale.
    pub async fn attempt_status(
        &self,
        actor: Actor,
        attempt_id: i64,
    ) -> Result<AttemptView, AppError> {
        let attempt = self.readable_attempt(actor, attempt_id).await?;
        let meta = self.require_meta(attempt.quiz_id).await?;
        let attempt = self.refresh_with(attempt, &meta).await?;

        let remaining = match attempt.status {
            AttemptStatus::InProgress => Some(remaining_seconds(&attempt, &meta, self.clock.now())),
            _ => None,
        };

        Ok(AttemptView {
            time_spent_display: attempt.formatted_time_spent(),
            remaining_seconds: remaining,
            attempt,
        })
    }

    /// Question-by-question breakdown of a finished attempt. The answer key is
    /// never revealed while the attempt is still open.
    pub async fn review(&self, actor: Actor, attempt_id: i64) -> Result<AttemptReview, AppError> {
        let attempt = self.readable_attempt(actor, attempt_id).await?;
        let attempt = self.refresh(attempt).await?;
        if !attempt.status.is_terminal() {
            return Err(AppError::InvariantViolation(format!(
                "Attempt {} can be reviewed once it is finished",
                attempt_id
            )));
        }

        let questions = self.bank.list_questions(attempt.quiz_id).await?;
        let answers: HashMap<i64, Option<OptionLabel>> = self
            .attempts
            .list_answers(attempt_id)
            .await?
            .into_iter()
            .map(|a| (a.question_id, a.selected_label))
            .collect();

        let items = questions
            .into_iter()
            .map(|q| {
                let selected_label = answers.get(&q.id).copied().flatten();
                ReviewItem {
                    question_id: q.id,
                    is_correct: scoring::grade(q.correct_label, selected_label),
                    question_text: q.question_text,
                    selected_label,
                    correct_label: q.correct_label,
                }
            })
            .collect();

        Ok(AttemptReview { attempt, items })
    }

    /// Expires every open attempt whose budget ran out. Returns how many were closed.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let open = self.attempts.list_in_progress().await?;
        let refreshed = self.refresh_all(open).await?;
        Ok(refreshed
            .iter()
            .filter(|a| a.status == AttemptStatus::Timeout)
            .count())
    }

    pub(super) async fn refresh_all(&self, attempts: Vec<Attempt>) -> Result<Vec<Attempt>, AppError> {
        let mut metas: HashMap<i64, QuizMeta> = HashMap::new();
        let mut refreshed = Vec::with_capacity(attempts.len());

        for attempt in attempts {
            if attempt.status.is_terminal() {
                refreshed.push(attempt);
                continue;
            }
            let meta = match metas.get(&attempt.quiz_id) {
                Some(meta) => *meta,
                None => {
                    let meta = self.require_meta(attempt.quiz_id).await?;
                    metas.insert(attempt.quiz_id, meta);
                    meta
                }
            };
            refreshed.push(self.refresh_with(attempt, &meta).await?);
        }

        Ok(refreshed)
    }

    async fn resume(&self, existing: Attempt, meta: &QuizMeta) -> Result<StartedAttempt, AppError> {
        let attempt = self.refresh_with(existing, meta).await?;
        if attempt.status.is_terminal() {
            return Err(AppError::InvariantViolation(format!(
                "Quiz {} has already been taken",
                attempt.quiz_id
            )));
        }

        tracing::debug!("Resuming attempt {}", attempt.id);
        let now = self.clock.now();
        self.present(attempt, meta, false, now).await
    }

    async fn present(
        &self,
        attempt: Attempt,
        meta: &QuizMeta,
        created: bool,
        now: DateTime<Utc>,
    ) -> Result<StartedAttempt, AppError> {
        let questions = self.bank.list_questions_for_attempt(attempt.quiz_id).await?;

        Ok(StartedAttempt {
            questions: shuffle_questions(questions, rand::random()),
            remaining_seconds: remaining_seconds(&attempt, meta, now),
            created,
            attempt,
        })
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Attempt, AppError> {
        self.attempts
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    /// Attempts are private to their participant; foreign ids look missing.
    async fn owned_attempt(&self, participant_id: i64, attempt_id: i64) -> Result<Attempt, AppError> {
        self.readable_attempt(Actor::Participant(participant_id), attempt_id)
            .await
    }

    async fn readable_attempt(&self, actor: Actor, attempt_id: i64) -> Result<Attempt, AppError> {
        let attempt = self.find_attempt(attempt_id).await?;
        if !actor.can_read(&attempt) {
            return Err(AppError::NotFound(format!("Attempt {} not found", attempt_id)));
        }
        Ok(attempt)
    }

    async fn refresh(&self, attempt: Attempt) -> Result<Attempt, AppError> {
        if attempt.status.is_terminal() {
            return Ok(attempt);
        }
        let meta = self.require_meta(attempt.quiz_id).await?;
        self.refresh_with(attempt, &meta).await
    }

    /// Applies a pending timeout. When another caller finalizes first, the
    /// stored outcome is returned instead.
    async fn refresh_with(&self, attempt: Attempt, meta: &QuizMeta) -> Result<Attempt, AppError> {
        let now = self.clock.now();
        if attempt.status.is_terminal() || !is_expired(&attempt, meta, now) {
            return Ok(attempt);
        }

        match self.finalize(&attempt, AttemptStatus::Timeout, now).await? {
            Some(expired) => Ok(expired),
            None => self.find_attempt(attempt.id).await,
        }
    }

    /// Performs the guarded transition; the store scores the answers in the
    /// same atomic step. `None` means the attempt had already left `in_progress`.
    async fn finalize(
        &self,
        attempt: &Attempt,
        status: AttemptStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Attempt>, AppError> {
        let key = self.bank.correct_answer_key(attempt.quiz_id).await?;
        let outcome = Finalization {
            status,
            submitted_at: now,
        };

        let Some(finished) = self
            .attempts
            .finalize_attempt(attempt.id, &outcome, &key)
            .await?
        else {
            tracing::warn!(
                "Attempt {} was finalized concurrently, keeping the stored result",
                attempt.id
            );
            return Ok(None);
        };

        tracing::info!(
            "Attempt {} finished as {} with score {:.2} ({}/{})",
            finished.id,
            finished.status,
            finished.score,
            finished.correct_answers,
            finished.total_questions
        );
        Ok(Some(finished))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{
        exam::clock::{Clock, ManualClock},
        models::{question::CreateQuestionRequest, quiz::CreateQuizRequest},
        storage::{AnswerKey, AttemptStore, MemoryStore, QuestionBank},
    };

    /// Delegates to a `MemoryStore`, but writes one queued answer right before
    /// the terminal transition, the way a request racing a submit would.
    struct AnswerBeforeFinalize {
        inner: Arc<MemoryStore>,
        queued: Mutex<Option<AnswerUpsert>>,
    }

    #[async_trait]
    impl AttemptStore for AnswerBeforeFinalize {
        async fn insert_or_get_attempt(
            &self,
            quiz_id: i64,
            participant_id: i64,
            started_at: DateTime<Utc>,
        ) -> Result<(Attempt, bool), AppError> {
            self.inner
                .insert_or_get_attempt(quiz_id, participant_id, started_at)
                .await
        }

        async fn find_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
            self.inner.find_attempt(attempt_id).await
        }

        async fn find_attempt_for(
            &self,
            participant_id: i64,
            quiz_id: i64,
        ) -> Result<Option<Attempt>, AppError> {
            self.inner.find_attempt_for(participant_id, quiz_id).await
        }

        async fn upsert_answer(&self, answer: &AnswerUpsert) -> Result<Option<Answer>, AppError> {
            self.inner.upsert_answer(answer).await
        }

        async fn list_answers(&self, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
            self.inner.list_answers(attempt_id).await
        }

        async fn finalize_attempt(
            &self,
            attempt_id: i64,
            outcome: &Finalization,
            key: &AnswerKey,
        ) -> Result<Option<Attempt>, AppError> {
            let queued = self.queued.lock().unwrap().take();
            if let Some(answer) = queued {
                self.inner.upsert_answer(&answer).await?;
            }
            self.inner.finalize_attempt(attempt_id, outcome, key).await
        }

        async fn list_terminal_attempts(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_terminal_attempts(quiz_id).await
        }

        async fn list_attempts_by_quiz(&self, quiz_id: i64) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_attempts_by_quiz(quiz_id).await
        }

        async fn list_attempts_by_participant(
            &self,
            participant_id: i64,
        ) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_attempts_by_participant(participant_id).await
        }

        async fn list_all_attempts(&self) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_all_attempts().await
        }

        async fn list_in_progress(&self) -> Result<Vec<Attempt>, AppError> {
            self.inner.list_in_progress().await
        }
    }

    struct Harness {
        service: ExamService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        quiz_id: i64,
        question_ids: Vec<i64>,
    }

    /// A published 30-minute quiz whose correct answer is always `A`.
    async fn harness(questions: usize) -> Harness {
        harness_with(questions, 30, None).await
    }

    async fn harness_with(
        questions: usize,
        duration_minutes: i64,
        deadline: Option<DateTime<Utc>>,
    ) -> Harness {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new());

        let quiz = store
            .create_quiz(
                &CreateQuizRequest {
                    title: "Rust basics".to_string(),
                    description: None,
                    duration_minutes: Some(duration_minutes),
                    deadline,
                },
                start,
            )
            .await
            .unwrap();

        let mut question_ids = Vec::new();
        for i in 0..questions {
            let q = store
                .add_question(
                    quiz.id,
                    &CreateQuestionRequest {
                        question_text: format!("Question {}", i),
                        option_a: "right".to_string(),
                        option_b: "wrong".to_string(),
                        option_c: "wrong".to_string(),
                        option_d: "wrong".to_string(),
                        correct_label: OptionLabel::A,
                        question_order: None,
                    },
                )
                .await
                .unwrap();
            question_ids.push(q.id);
        }
        store.set_published(quiz.id, true).await.unwrap();

        let service = ExamService::new(store.clone(), store.clone(), clock.clone());
        Harness {
            service,
            store,
            clock,
            quiz_id: quiz.id,
            question_ids,
        }
    }

    #[tokio::test]
    async fn start_hides_the_key_and_opens_an_attempt() {
        let h = harness(4).await;

        let started = h.service.start(11, h.quiz_id).await.unwrap();
        assert!(started.created);
        assert_eq!(started.attempt.status, AttemptStatus::InProgress);
        assert_eq!(started.attempt.score, 0.0);
        assert_eq!(started.attempt.correct_answers, 0);
        assert_eq!(started.questions.len(), 4);
        assert_eq!(started.remaining_seconds, 30 * 60);

        let mut ids: Vec<i64> = started.questions.iter().map(|q| q.id).collect();
        ids.sort();
        assert_eq!(ids, h.question_ids);
    }

    #[tokio::test]
    async fn start_again_resumes_the_open_attempt() {
        let h = harness(2).await;

        let first = h.service.start(11, h.quiz_id).await.unwrap();
        h.clock.advance(TimeDelta::minutes(5));
        let second = h.service.start(11, h.quiz_id).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.attempt.id, first.attempt.id);
        assert_eq!(second.remaining_seconds, 25 * 60);
        assert_eq!(h.store.list_all_attempts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_share_one_attempt() {
        let h = harness(2).await;

        let (a, b) = tokio::join!(h.service.start(11, h.quiz_id), h.service.start(11, h.quiz_id));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.attempt.id, b.attempt.id);
        assert_eq!(h.store.list_attempts_by_quiz(h.quiz_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_second_attempt_after_finishing() {
        let h = harness(2).await;

        let started = h.service.start(11, h.quiz_id).await.unwrap();
        h.service.submit(11, started.attempt.id).await.unwrap();

        let err = h.service.start(11, h.quiz_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn unpublished_or_unknown_quiz_cannot_be_started() {
        let h = harness(2).await;
        h.store.set_published(h.quiz_id, false).await.unwrap();

        let err = h.service.start(11, h.quiz_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        let err = h.service.start(11, 9_999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn quiz_past_deadline_cannot_be_started() {
        let deadline = Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap();
        let h = harness_with(2, 30, Some(deadline)).await;

        let err = h.service.start(11, h.quiz_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn submit_scores_the_attempt() {
        let h = harness(10).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;

        for (i, question_id) in h.question_ids.iter().enumerate() {
            let label = if i < 7 { "A" } else { "B" };
            h.service
                .record_answer(11, attempt.id, *question_id, Some(label))
                .await
                .unwrap();
        }

        h.clock.advance(TimeDelta::seconds(754));
        let done = h.service.submit(11, attempt.id).await.unwrap();

        assert_eq!(done.status, AttemptStatus::Completed);
        assert_eq!(done.total_questions, 10);
        assert_eq!(done.correct_answers, 7);
        assert_eq!(done.score, 70.0);
        assert_eq!(done.time_spent, Some(754));
        assert_eq!(h.store.find_attempt(attempt.id).await.unwrap().unwrap(), done);
    }

    #[tokio::test]
    async fn second_submit_fails_and_keeps_the_first_result() {
        let h = harness(2).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.service
            .record_answer(11, attempt.id, h.question_ids[0], Some("A"))
            .await
            .unwrap();

        h.clock.advance(TimeDelta::seconds(60));
        let first = h.service.submit(11, attempt.id).await.unwrap();

        h.clock.advance(TimeDelta::seconds(60));
        let err = h.service.submit(11, attempt.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        let stored = h.store.find_attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.score, first.score);
        assert_eq!(stored.time_spent, Some(60));
    }

    #[tokio::test]
    async fn answer_upsert_keeps_only_the_latest_choice() {
        let h = harness(3).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        let question_id = h.question_ids[1];

        let first = h
            .service
            .record_answer(11, attempt.id, question_id, Some("A"))
            .await
            .unwrap();
        assert!(first.is_correct);

        let second = h
            .service
            .record_answer(11, attempt.id, question_id, Some("C"))
            .await
            .unwrap();
        assert!(!second.is_correct);
        assert_eq!(second.id, first.id);

        let answers = h.store.list_answers(attempt.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].selected_label, Some(OptionLabel::C));
        assert!(!answers[0].is_correct);

        // Blank clears the response without adding a row.
        let cleared = h
            .service
            .record_answer(11, attempt.id, question_id, Some(""))
            .await
            .unwrap();
        assert_eq!(cleared.selected_label, None);
        assert_eq!(h.store.list_answers(attempt.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn answer_validation_happens_before_lookups() {
        let h = harness(1).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;

        let err = h
            .service
            .record_answer(11, attempt.id, h.question_ids[0], Some("E"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .service
            .record_answer(11, attempt.id, 424_242, Some("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = h
            .service
            .record_answer(12, attempt.id, h.question_ids[0], Some("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn expire_scores_only_what_was_answered() {
        let h = harness(5).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        for question_id in &h.question_ids[..2] {
            h.service
                .record_answer(11, attempt.id, *question_id, Some("A"))
                .await
                .unwrap();
        }

        let err = h.service.expire(attempt.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        h.clock.advance(TimeDelta::minutes(31));
        let expired = h.service.expire(attempt.id).await.unwrap();

        assert_eq!(expired.status, AttemptStatus::Timeout);
        assert_eq!(expired.total_questions, 5);
        assert_eq!(expired.correct_answers, 2);
        assert_eq!(expired.score, 40.0);

        let err = h.service.expire(attempt.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn late_answer_expires_the_attempt_and_is_rejected() {
        let h = harness(3).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.service
            .record_answer(11, attempt.id, h.question_ids[0], Some("A"))
            .await
            .unwrap();

        h.clock.advance(TimeDelta::minutes(45));
        let err = h
            .service
            .record_answer(11, attempt.id, h.question_ids[1], Some("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        let view = h
            .service
            .attempt_status(Actor::Participant(11), attempt.id)
            .await
            .unwrap();
        assert_eq!(view.attempt.status, AttemptStatus::Timeout);
        assert_eq!(view.attempt.correct_answers, 1);
        assert_eq!(view.remaining_seconds, None);
        assert_eq!(h.store.list_answers(attempt.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn late_submit_records_a_timeout_instead() {
        let h = harness(2).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;

        h.clock.advance(TimeDelta::minutes(31));
        let err = h.service.submit(11, attempt.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        let stored = h.store.find_attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Timeout);
    }

    #[tokio::test]
    async fn status_read_applies_pending_expiry() {
        let h = harness(1).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;

        let view = h
            .service
            .attempt_status(Actor::Admin, attempt.id)
            .await
            .unwrap();
        assert_eq!(view.attempt.status, AttemptStatus::InProgress);
        assert_eq!(view.remaining_seconds, Some(1800));
        assert_eq!(view.time_spent_display, "N/A");

        h.clock.advance(TimeDelta::minutes(30) + TimeDelta::seconds(1));
        let view = h
            .service
            .attempt_status(Actor::Admin, attempt.id)
            .await
            .unwrap();
        assert_eq!(view.attempt.status, AttemptStatus::Timeout);
        assert_eq!(view.time_spent_display, "30:01");

        let err = h
            .service
            .attempt_status(Actor::Participant(99), attempt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn review_reveals_the_key_only_after_finishing() {
        let h = harness(2).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.service
            .record_answer(11, attempt.id, h.question_ids[0], Some("B"))
            .await
            .unwrap();

        let err = h
            .service
            .review(Actor::Participant(11), attempt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        h.service.submit(11, attempt.id).await.unwrap();
        let review = h
            .service
            .review(Actor::Participant(11), attempt.id)
            .await
            .unwrap();

        assert_eq!(review.items.len(), 2);
        assert_eq!(review.items[0].selected_label, Some(OptionLabel::B));
        assert_eq!(review.items[0].correct_label, OptionLabel::A);
        assert!(!review.items[0].is_correct);
        assert_eq!(review.items[1].selected_label, None);
    }

    #[tokio::test]
    async fn sweep_closes_only_exhausted_attempts() {
        let h = harness(1).await;
        let early = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.clock.advance(TimeDelta::minutes(20));
        let late = h.service.start(12, h.quiz_id).await.unwrap().attempt;

        h.clock.advance(TimeDelta::minutes(15));
        assert_eq!(h.service.sweep_expired().await.unwrap(), 1);

        let early = h.store.find_attempt(early.id).await.unwrap().unwrap();
        let late = h.store.find_attempt(late.id).await.unwrap().unwrap();
        assert_eq!(early.status, AttemptStatus::Timeout);
        assert_eq!(late.status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn empty_quiz_submits_with_zero_score() {
        let h = harness(0).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;

        let done = h.service.submit(11, attempt.id).await.unwrap();
        assert_eq!(done.total_questions, 0);
        assert_eq!(done.score, 0.0);
    }

    #[tokio::test]
    async fn answer_landing_just_before_submit_is_scored() {
        let h = harness(2).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;

        let racing = Arc::new(AnswerBeforeFinalize {
            inner: h.store.clone(),
            queued: Mutex::new(Some(AnswerUpsert {
                attempt_id: attempt.id,
                question_id: h.question_ids[0],
                selected_label: Some(OptionLabel::A),
                is_correct: true,
                answered_at: h.clock.now(),
            })),
        });
        let service = ExamService::new(h.store.clone(), racing, h.clock.clone());

        h.clock.advance(TimeDelta::seconds(90));
        let done = service.submit(11, attempt.id).await.unwrap();

        let answers = h.store.list_answers(attempt.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert!(answers[0].is_correct);
        assert_eq!(done.correct_answers, 1);
        assert_eq!(done.score, 50.0);
        assert_eq!(h.store.find_attempt(attempt.id).await.unwrap().unwrap(), done);
    }

    #[tokio::test]
    async fn store_finalizes_an_attempt_only_once() {
        let h = harness(2).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.service
            .record_answer(11, attempt.id, h.question_ids[1], Some("A"))
            .await
            .unwrap();
        let key = h.store.correct_answer_key(h.quiz_id).await.unwrap();

        h.clock.advance(TimeDelta::seconds(40));
        let first = h
            .store
            .finalize_attempt(
                attempt.id,
                &Finalization {
                    status: AttemptStatus::Completed,
                    submitted_at: h.clock.now(),
                },
                &key,
            )
            .await
            .unwrap()
            .expect("first transition wins");
        assert_eq!(first.status, AttemptStatus::Completed);
        assert_eq!(first.time_spent, Some(40));
        assert_eq!(first.score, 50.0);

        h.clock.advance(TimeDelta::minutes(40));
        let second = h
            .store
            .finalize_attempt(
                attempt.id,
                &Finalization {
                    status: AttemptStatus::Timeout,
                    submitted_at: h.clock.now(),
                },
                &key,
            )
            .await
            .unwrap();
        assert_eq!(second, None);
        assert_eq!(h.store.find_attempt(attempt.id).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn expiry_losing_to_a_submit_keeps_the_submitted_result() {
        let h = harness(3).await;
        // Snapshot taken while the attempt is still open.
        let stale = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.service
            .record_answer(11, stale.id, h.question_ids[0], Some("A"))
            .await
            .unwrap();

        h.clock.advance(TimeDelta::seconds(60));
        let submitted = h.service.submit(11, stale.id).await.unwrap();

        h.clock.advance(TimeDelta::minutes(31));
        let meta = h.service.require_meta(h.quiz_id).await.unwrap();
        let seen = h.service.refresh_with(stale.clone(), &meta).await.unwrap();
        assert_eq!(seen, submitted);
        assert_eq!(seen.status, AttemptStatus::Completed);

        let lost = h
            .service
            .finalize(&stale, AttemptStatus::Timeout, h.clock.now())
            .await
            .unwrap();
        assert_eq!(lost, None);
        assert_eq!(h.store.find_attempt(stale.id).await.unwrap().unwrap(), submitted);
    }

    #[tokio::test]
    async fn racing_submit_and_expire_end_in_one_timeout() {
        let h = harness(2).await;
        let attempt = h.service.start(11, h.quiz_id).await.unwrap().attempt;
        h.service
            .record_answer(11, attempt.id, h.question_ids[0], Some("A"))
            .await
            .unwrap();

        h.clock.advance(TimeDelta::minutes(31));
        let (submitted, expired) =
            tokio::join!(h.service.submit(11, attempt.id), h.service.expire(attempt.id));

        // A late submit never completes the attempt.
        assert!(matches!(submitted, Err(AppError::InvariantViolation(_))));

        let stored = h.store.find_attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Timeout);
        assert_eq!(stored.correct_answers, 1);
        match expired {
            Ok(winner) => assert_eq!(winner, stored),
            Err(err) => assert!(matches!(err, AppError::InvariantViolation(_))),
        }
        assert_eq!(h.store.list_terminal_attempts(h.quiz_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn questions_are_frozen_while_an_attempt_is_open() {
        let h = harness(1).await;
        let started = h.service.start(11, h.quiz_id).await.unwrap();
        assert_eq!(started.questions.len(), 1);

        let extra = || CreateQuestionRequest {
            question_text: "Added later".to_string(),
            option_a: "right".to_string(),
            option_b: "wrong".to_string(),
            option_c: "wrong".to_string(),
            option_d: "wrong".to_string(),
            correct_label: OptionLabel::A,
            question_order: None,
        };

        h.service.set_published(h.quiz_id, false).await.unwrap();
        let err = h.service.add_question(h.quiz_id, extra()).await.unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        let resumed = h.service.start(11, h.quiz_id).await.unwrap();
        assert_eq!(resumed.attempt.id, started.attempt.id);
        assert_eq!(resumed.questions.len(), 1);

        // Once the open attempt runs out of time the bank may change again.
        h.clock.advance(TimeDelta::minutes(31));
        h.service.add_question(h.quiz_id, extra()).await.unwrap();

        let stored = h.store.find_attempt(started.attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Timeout);
        assert_eq!(stored.total_questions, 1);
    }

    #[test]
    fn shuffle_is_a_permutation_and_seed_stable() {
        let questions: Vec<PublicQuestion> = (1..=8)
            .map(|id| PublicQuestion {
                id,
                question_text: format!("Q{}", id),
                option_a: "a".into(),
                option_b: "b".into(),
                option_c: "c".into(),
                option_d: "d".into(),
            })
            .collect();

        let once = shuffle_questions(questions.clone(), 42);
        let twice = shuffle_questions(questions.clone(), 42);
        assert_eq!(once, twice);

        let mut ids: Vec<i64> = once.iter().map(|q| q.id).collect();
        ids.sort();
        assert_eq!(ids, (1..=8).collect::<Vec<i64>>());
    }
}
