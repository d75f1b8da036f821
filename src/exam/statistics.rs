// src/exam/statistics.rs

use serde::Serialize;

use super::ExamService;
use crate::{config::PASSING_SCORE, error::AppError, models::attempt::Attempt};

/// Counts per fixed score band. Bands are closed on their upper bound, so a
/// fractional score such as 40.5 lands in the next band up.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreDistribution {
    pub range_0_40: i64,
    pub range_41_60: i64,
    pub range_61_75: i64,
    pub range_76_85: i64,
    pub range_86_100: i64,
}

impl ScoreDistribution {
    fn record(&mut self, score: f64) {
        let band = if score <= 40.0 {
            &mut self.range_0_40
        } else if score <= 60.0 {
            &mut self.range_41_60
        } else if score <= 75.0 {
            &mut self.range_61_75
        } else if score <= 85.0 {
            &mut self.range_76_85
        } else {
            &mut self.range_86_100
        };
        *band += 1;
    }
}

/// Aggregate view over every finished attempt of a quiz. All numbers are 0
/// when nobody has finished yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuizStatistics {
    pub quiz_id: i64,
    pub total_submissions: i64,
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    /// Mean of time spent in seconds, truncated.
    pub average_time_spent: i64,
    pub min_time_spent: i64,
    pub max_time_spent: i64,
    pub distribution: ScoreDistribution,
    pub passed_count: i64,
    pub failed_count: i64,
    pub pass_rate: f64,
}

impl QuizStatistics {
    /// Folds the attempts in a single pass. In-progress attempts are skipped.
    pub fn from_attempts(quiz_id: i64, attempts: &[Attempt]) -> Self {
        let mut stats = QuizStatistics {
            quiz_id,
            ..Default::default()
        };

        let mut score_sum = 0.0;
        let mut time_sum: i64 = 0;

        for attempt in attempts.iter().filter(|a| a.status.is_terminal()) {
            let time_spent = attempt.time_spent.unwrap_or(0);

            if stats.total_submissions == 0 {
                stats.highest_score = attempt.score;
                stats.lowest_score = attempt.score;
                stats.min_time_spent = time_spent;
                stats.max_time_spent = time_spent;
            } else {
                stats.highest_score = stats.highest_score.max(attempt.score);
                stats.lowest_score = stats.lowest_score.min(attempt.score);
                stats.min_time_spent = stats.min_time_spent.min(time_spent);
                stats.max_time_spent = stats.max_time_spent.max(time_spent);
            }

            stats.total_submissions += 1;
            score_sum += attempt.score;
            time_sum += time_spent;

            stats.distribution.record(attempt.score);
            if attempt.score >= PASSING_SCORE {
                stats.passed_count += 1;
            } else {
                stats.failed_count += 1;
            }
        }

        if stats.total_submissions > 0 {
            let count = stats.total_submissions;
            stats.average_score = score_sum / count as f64;
            stats.average_time_spent = time_sum / count;
            stats.pass_rate = 100.0 * stats.passed_count as f64 / count as f64;
        }

        stats
    }
}

impl ExamService {
    /// Recomputes a quiz's statistics from a fresh snapshot of its finished attempts.
    pub async fn compute_statistics(&self, quiz_id: i64) -> Result<QuizStatistics, AppError> {
        self.require_quiz(quiz_id).await?;
        let attempts = self.attempts.list_terminal_attempts(quiz_id).await?;
        tracing::debug!(
            "Computing statistics for quiz {} over {} attempts",
            quiz_id,
            attempts.len()
        );
        Ok(QuizStatistics::from_attempts(quiz_id, &attempts))
    }
}
