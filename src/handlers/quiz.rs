// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{error::AppError, exam::ExamService, utils::jwt::Claims};

/// Lists the quizzes participants can take.
pub async fn list_quizzes(
    State(exams): State<ExamService>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = exams.list_open_quizzes().await?;
    Ok(Json(quizzes))
}

/// Starts an attempt at a quiz, or resumes the caller's open one.
///
/// * Returns 201 with a fresh attempt, 200 when resuming.
/// * Questions come shuffled and without the answer key.
pub async fn start_attempt(
    State(exams): State<ExamService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let participant_id = claims.participant_id()?;
    let started = exams.start(participant_id, quiz_id).await?;

    let status = if started.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(started)))
}
