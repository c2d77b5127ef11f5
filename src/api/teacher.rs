use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::class;
use crate::notification::{self, NotificationKind};
use crate::profile::Role;
use crate::quiz;

use super::{AppState, SESSION_ROLE, SESSION_USER, error_response};

/// Session user id, provided the logged-in account is a teacher.
async fn teacher_id(session: &Session) -> Option<i64> {
    let user_id = session.get::<i64>(SESSION_USER).await.ok()??;
    let role = session.get::<Role>(SESSION_ROLE).await.ok()??;
    (role == Role::Teacher).then_some(user_id)
}

#[derive(Deserialize, ToSchema)]
pub struct CreateClassRequest {
    pub name: String,
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/create_class",
    method(post),
    request_body = CreateClassRequest,
    responses(
        (status = 200, description = "Class created", body = i64),
        (status = 401, description = "Not a teacher session")
    )
)]
pub async fn create_class(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<CreateClassRequest>,
) -> impl IntoResponse {
    let Some(teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match class::create_class(&state.db, teacher, req.name).await {
        Ok(id) => Json(id).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/classes",
    method(get),
    responses(
        (status = 200, description = "Classes owned by the teacher", body = Vec<class::ClassInfo>),
        (status = 401, description = "Not a teacher session")
    )
)]
pub async fn my_classes(State(state): State<Arc<AppState>>, session: Session) -> impl IntoResponse {
    let Some(teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match class::classes_of_teacher(&state.db, teacher).await {
        Ok(classes) => Json(classes).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct MembershipRequest {
    pub class_id: i64,
    pub user_id: i64,
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/add_student",
    method(post),
    request_body = MembershipRequest,
    responses(
        (status = 200, description = "Student enrolled"),
        (status = 401, description = "Not a teacher session"),
        (status = 403, description = "Class owned by someone else"),
        (status = 404, description = "No such student")
    )
)]
pub async fn add_student(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<MembershipRequest>,
) -> impl IntoResponse {
    let Some(teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    if let Err(e) = class::assert_owned_by(&state.db, req.class_id, teacher).await {
        return error_response(e);
    }
    match class::add_student(&state.db, req.class_id, req.user_id).await {
        Ok(()) => "Student enrolled".into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/remove_student",
    method(post),
    request_body = MembershipRequest,
    responses(
        (status = 200, description = "Student removed"),
        (status = 401, description = "Not a teacher session"),
        (status = 403, description = "Class owned by someone else")
    )
)]
pub async fn remove_student(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<MembershipRequest>,
) -> impl IntoResponse {
    let Some(teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    if let Err(e) = class::assert_owned_by(&state.db, req.class_id, teacher).await {
        return error_response(e);
    }
    match class::remove_student(&state.db, req.class_id, req.user_id).await {
        Ok(()) => "Student removed".into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/classes/{class_id}/roster",
    method(get),
    params(("class_id" = i64, Path, description = "Class id")),
    responses(
        (status = 200, description = "Member ids plus display map", body = class::ClassRoster),
        (status = 401, description = "Not a teacher session"),
        (status = 403, description = "Class owned by someone else")
    )
)]
pub async fn roster(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(class_id): Path<i64>,
) -> impl IntoResponse {
    let Some(teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    if let Err(e) = class::assert_owned_by(&state.db, class_id, teacher).await {
        return error_response(e);
    }
    match class::get_roster(&state.db, class_id).await {
        Ok(roster) => Json(roster).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/classes/{class_id}/attempts",
    method(get),
    params(("class_id" = i64, Path, description = "Class id")),
    responses(
        (status = 200, description = "Attempts by class members, newest first", body = Vec<quiz::AttemptInfo>),
        (status = 401, description = "Not a teacher session"),
        (status = 403, description = "Class owned by someone else")
    )
)]
pub async fn class_attempts(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(class_id): Path<i64>,
) -> impl IntoResponse {
    let Some(teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    if let Err(e) = class::assert_owned_by(&state.db, class_id, teacher).await {
        return error_response(e);
    }
    match quiz::attempts_of_class(&state.db, class_id).await {
        Ok(attempts) => Json(attempts).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct NotifyRequest {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

#[utoipa::path(
    context_path = "/api/teacher",
    path = "/notify",
    method(post),
    request_body = NotifyRequest,
    responses(
        (status = 200, description = "Notification created and pushed", body = i64),
        (status = 401, description = "Not a teacher session")
    )
)]
pub async fn notify(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    let Some(_teacher) = teacher_id(&session).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match notification::create_notification(
        &state.db,
        &state.hub,
        req.user_id,
        req.kind,
        req.title,
        req.body,
        req.link,
    )
    .await
    {
        Ok(notification) => Json(notification.id).into_response(),
        Err(e) => error_response(e),
    }
}

pub fn get_teacher_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/teacher",
        Router::new()
            .route("/create_class", post(create_class))
            .route("/classes", get(my_classes))
            .route("/add_student", post(add_student))
            .route("/remove_student", post(remove_student))
            .route("/classes/{class_id}/roster", get(roster))
            .route("/classes/{class_id}/attempts", get(class_attempts))
            .route("/notify", post(notify)),
    )
}
