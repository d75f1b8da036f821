// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    exam::ExamService,
    models::attempt::RecordAnswerRequest,
    utils::jwt::Claims,
};

/// Current status of an attempt. Owners and admins only.
pub async fn get_attempt(
    State(exams): State<ExamService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = exams.attempt_status(claims.actor()?, attempt_id).await?;
    Ok(Json(view))
}

/// Records or clears the answer to one question.
pub async fn record_answer(
    State(exams): State<ExamService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let participant_id = claims.participant_id()?;
    let answer = exams
        .record_answer(
            participant_id,
            attempt_id,
            req.question_id,
            req.selected.as_deref(),
        )
        .await?;

    // The grading flag stays server-side until the attempt is reviewed.
    Ok(Json(serde_json::json!({
        "attempt_id": answer.attempt_id,
        "question_id": answer.question_id,
        "selected": answer.selected_label,
        "answered_at": answer.answered_at,
    })))
}

/// Submits the attempt and returns the final score.
pub async fn submit_attempt(
    State(exams): State<ExamService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let participant_id = claims.participant_id()?;
    let attempt = exams.submit(participant_id, attempt_id).await?;

    Ok(Json(serde_json::json!({
        "attempt_id": attempt.id,
        "status": attempt.status,
        "score": attempt.score,
        "correct_answers": attempt.correct_answers,
        "total_questions": attempt.total_questions,
        "time_spent": attempt.time_spent,
        "time_spent_display": attempt.formatted_time_spent(),
        "message": "Exam submitted successfully"
    })))
}

/// Per-question breakdown of a finished attempt.
pub async fn review_attempt(
    State(exams): State<ExamService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let review = exams.review(claims.actor()?, attempt_id).await?;
    Ok(Json(review))
}

/// The caller's own attempts, most recent first.
pub async fn my_attempts(
    State(exams): State<ExamService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = exams
        .list_participant_attempts(claims.participant_id()?)
        .await?;
    Ok(Json(attempts))
}
