// src/exam/scoring.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    models::{
        answer::Answer,
        attempt::{Attempt, Finalization},
        question::OptionLabel,
    },
    storage::AnswerKey,
};

/// Aggregate outcome of grading one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreReport {
    pub total_questions: i64,
    pub correct_answers: i64,
    /// Percentage in `0.0..=100.0`.
    pub score: f64,
}

/// Exact-match grading of a single response. A cleared response is wrong.
pub fn grade(correct: OptionLabel, selected: Option<OptionLabel>) -> bool {
    selected == Some(correct)
}

/// `100 * correct / total`, defined as 0 for an empty quiz.
pub fn percentage(correct: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * correct as f64 / total as f64
}

/// Scores an attempt's answers against the quiz's answer key.
///
/// Every question in the key counts towards the total, answered or not.
/// Answers to questions outside the key are ignored, and correctness is
/// recomputed from the key rather than trusted from the stored flag.
pub fn score_answers(key: &AnswerKey, answers: &[Answer]) -> ScoreReport {
    let selected: HashMap<i64, Option<OptionLabel>> = answers
        .iter()
        .map(|a| (a.question_id, a.selected_label))
        .collect();

    let total_questions = key.len() as i64;
    let correct_answers = key
        .iter()
        .filter(|&(question_id, correct)| {
            selected
                .get(question_id)
                .is_some_and(|choice| grade(*correct, *choice))
        })
        .count() as i64;

    ScoreReport {
        total_questions,
        correct_answers,
        score: percentage(correct_answers, total_questions),
    }
}

/// The terminal form of `attempt`, scored over `answers`.
///
/// Stores call this while they hold the attempt exclusively, so the answers
/// scored here are exactly the answers persisted next to the result.
pub fn finalized(
    attempt: &Attempt,
    outcome: &Finalization,
    key: &AnswerKey,
    answers: &[Answer],
) -> Attempt {
    let report = score_answers(key, answers);

    Attempt {
        status: outcome.status,
        submitted_at: Some(outcome.submitted_at),
        time_spent: Some((outcome.submitted_at - attempt.started_at).num_seconds().max(0)),
        total_questions: report.total_questions,
        correct_answers: report.correct_answers,
        score: report.score,
        ..attempt.clone()
    }
}
