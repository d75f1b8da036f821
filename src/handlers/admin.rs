// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    exam::ExamService,
    models::{
        question::CreateQuestionRequest,
        quiz::{CreateQuizRequest, PublishRequest},
    },
};

/// Lists every quiz with question and finished-attempt counts.
/// Admin only.
pub async fn list_quizzes(
    State(exams): State<ExamService>,
) -> Result<impl IntoResponse, AppError> {
    let overviews = exams.list_quiz_overviews().await?;
    Ok(Json(overviews))
}

/// Creates a new (unpublished) quiz.
/// Admin only.
pub async fn create_quiz(
    State(exams): State<ExamService>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = exams.create_quiz(payload).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Adds a question to an unpublished quiz.
/// Admin only.
pub async fn create_question(
    State(exams): State<ExamService>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = exams.add_question(quiz_id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Publishes or unpublishes a quiz.
/// Admin only.
pub async fn publish_quiz(
    State(exams): State<ExamService>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = exams.set_published(quiz_id, payload.published).await?;
    Ok(Json(quiz))
}

/// Score distribution, pass rate and timing for a quiz.
/// Admin only.
pub async fn quiz_statistics(
    State(exams): State<ExamService>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let stats = exams.compute_statistics(quiz_id).await?;
    Ok(Json(stats))
}

/// All attempts at one quiz.
/// Admin only.
pub async fn quiz_attempts(
    State(exams): State<ExamService>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = exams.list_quiz_attempts(quiz_id).await?;
    Ok(Json(attempts))
}

/// Every attempt in the system.
/// Admin only.
pub async fn list_attempts(
    State(exams): State<ExamService>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = exams.list_all_attempts().await?;
    Ok(Json(attempts))
}
