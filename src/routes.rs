// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (quizzes, attempts, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (exam service, config).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            axum::http::HeaderValue::from_static("http://localhost:3000"),
            axum::http::HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        // Protected quiz routes
        .merge(
            Router::new()
                .route("/{id}/attempts", post(quiz::start_attempt))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let attempt_routes = Router::new()
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", put(attempt::record_answer))
        .route("/{id}/submit", post(attempt::submit_attempt))
        .route("/{id}/review", get(attempt::review_attempt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let me_routes = Router::new()
        .route("/attempts", get(attempt::my_attempts))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/quizzes", get(admin::list_quizzes).post(admin::create_quiz))
        .route("/quizzes/{id}/questions", post(admin::create_question))
        .route("/quizzes/{id}/publish", put(admin::publish_quiz))
        .route("/quizzes/{id}/statistics", get(admin::quiz_statistics))
        .route("/quizzes/{id}/attempts", get(admin::quiz_attempts))
        .route("/attempts", get(admin::list_attempts))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/me", me_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
