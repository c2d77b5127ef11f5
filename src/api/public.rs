use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::profile::{self, SignupRequest};
use crate::syllabus;

use super::{AppState, SESSION_ROLE, SESSION_USER, error_response};

#[utoipa::path(
    context_path = "/api/public",
    path = "/signup",
    method(post),
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = i64),
        (status = 400, description = "Invalid username"),
        (status = 409, description = "Username or email taken")
    )
)]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> impl IntoResponse {
    match profile::signup(&state.db, req).await {
        Ok(id) => Json(id).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful"),
        (status = 400, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    match profile::login(&state.db, req.email, req.password).await {
        Ok((id, role)) => {
            if let Err(e) = session.insert(SESSION_USER, id).await {
                return error_response(e.into());
            }
            if let Err(e) = session.insert(SESSION_ROLE, role).await {
                return error_response(e.into());
            }
            "Login successful".into_response()
        }
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/logout",
    method(post),
    responses((status = 200, description = "Logout successful"))
)]
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.delete().await;
    "Logout successful".into_response()
}

#[derive(Deserialize, ToSchema)]
pub struct UsernameQuery {
    pub username: String,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/username_available",
    method(get),
    params(("username" = String, Query, description = "Username to check")),
    responses((status = 200, description = "Whether the username is free", body = bool))
)]
pub async fn username_available(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsernameQuery>,
) -> impl IntoResponse {
    Json(profile::username_available(&state.db, &query.username).await)
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/topics",
    method(get),
    responses((status = 200, description = "Syllabus topics", body = Vec<syllabus::TopicInfo>))
)]
pub async fn topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match syllabus::list_topics(&state.db).await {
        Ok(topics) => Json(topics).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/topics/{topic_id}/chapters",
    method(get),
    params(("topic_id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Chapters of a topic", body = Vec<syllabus::ChapterInfo>))
)]
pub async fn chapters(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<i64>,
) -> impl IntoResponse {
    match syllabus::list_chapters(&state.db, topic_id).await {
        Ok(chapters) => Json(chapters).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/chapters/{chapter_id}/subtopics",
    method(get),
    params(("chapter_id" = i64, Path, description = "Chapter id")),
    responses((status = 200, description = "Subtopics of a chapter", body = Vec<syllabus::SubtopicInfo>))
)]
pub async fn subtopics(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
) -> impl IntoResponse {
    match syllabus::list_subtopics(&state.db, chapter_id).await {
        Ok(subtopics) => Json(subtopics).into_response(),
        Err(e) => error_response(e),
    }
}

pub fn get_public_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/public",
        Router::new()
            .route("/signup", post(signup))
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/username_available", get(username_available))
            .route("/topics", get(topics))
            .route("/topics/{topic_id}/chapters", get(chapters))
            .route("/chapters/{chapter_id}/subtopics", get(subtopics)),
    )
}
