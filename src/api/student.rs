use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::class;
use crate::leaderboard::Period;
use crate::notification;
use crate::profile::{self, ProfileEdit};
use crate::quiz::{self, QuizSubmission};

use super::{AppState, SESSION_USER, error_response};

#[utoipa::path(
    context_path = "/api/student",
    path = "/profile",
    method(get),
    responses(
        (status = 200, description = "Own profile with gamification stats", body = profile::UserProfile),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match profile::get_profile(&state.db, user_id).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/update_profile",
    method(post),
    request_body = ProfileEdit,
    responses(
        (status = 200, description = "Profile updated, rosters re-synced"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(edit): Json<ProfileEdit>,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match profile::update_profile(&state.db, user_id, edit).await {
        Ok(()) => "Profile updated".into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/subtopics/{subtopic_id}/questions",
    method(get),
    params(("subtopic_id" = i64, Path, description = "Subtopic id")),
    responses(
        (status = 200, description = "Quiz questions, answer key withheld", body = Vec<quiz::QuestionView>),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn questions(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(subtopic_id): Path<i64>,
) -> impl IntoResponse {
    let Ok(Some(_)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match quiz::questions_for_subtopic(&state.db, subtopic_id).await {
        Ok(questions) => Json(questions).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/submit_quiz",
    method(post),
    request_body = QuizSubmission,
    responses(
        (status = 200, description = "Scored result", body = quiz::QuizResult),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "Unknown subtopic")
    )
)]
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(submission): Json<QuizSubmission>,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match quiz::submit_quiz(&state.db, user_id, submission).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/attempts",
    method(get),
    responses(
        (status = 200, description = "Own attempt history", body = Vec<quiz::AttemptInfo>),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn attempts(State(state): State<Arc<AppState>>, session: Session) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match quiz::attempts_of_user(&state.db, user_id).await {
        Ok(attempts) => Json(attempts).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LeaderboardQuery {
    pub period: Period,
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/leaderboard",
    method(get),
    params(("period" = String, Query, description = "day | week | month | all")),
    responses(
        (status = 200, description = "Top entries plus own rank", body = crate::leaderboard::Standings),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    let keys = crate::leaderboard::PeriodKeys::now();
    let period_id = query.period.resolve(&keys);
    match state
        .leaderboards
        .standings(period_id, user_id, state.config.leaderboard_page_size)
        .await
    {
        Ok(standings) => Json(standings).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/classes",
    method(get),
    responses(
        (status = 200, description = "Classes the student belongs to", body = Vec<class::ClassInfo>),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn my_classes(State(state): State<Arc<AppState>>, session: Session) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match class::classes_of_student(&state.db, user_id).await {
        Ok(classes) => Json(classes).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/notifications",
    method(get),
    responses(
        (status = 200, description = "Newest notifications, capped page", body = Vec<notification::Notification>),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match notification::list_notifications(&state.db, user_id, state.config.notification_page_size)
        .await
    {
        Ok(notifications) => Json(notifications).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/notifications/{id}/read",
    method(post),
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "Not the owner's notification")
    )
)]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match notification::mark_read(&state.db, user_id, id).await {
        Ok(()) => "Marked read".into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/notifications/read_all",
    method(post),
    responses((status = 200, description = "All marked read"), (status = 401, description = "Not logged in"))
)]
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match notification::mark_all_read(&state.db, user_id).await {
        Ok(()) => "All marked read".into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/notifications/{id}",
    method(delete),
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "Not the owner's notification")
    )
)]
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match notification::delete_notification(&state.db, user_id, id).await {
        Ok(()) => "Deleted".into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/notifications",
    method(delete),
    responses(
        (status = 200, description = "Number of notifications cleared", body = u64),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn clear_notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    match notification::clear_notifications(&state.db, user_id).await {
        Ok(deleted) => Json(deleted).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/notifications/stream",
    method(get),
    responses(
        (status = 200, description = "Server-sent events, one per pushed notification"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn notification_stream(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> impl IntoResponse {
    let Ok(Some(user_id)) = session.get::<i64>(SESSION_USER).await else {
        return (StatusCode::UNAUTHORIZED, ()).into_response();
    };
    let subscription = state.hub.subscribe(user_id);
    // the subscription rides inside the stream; client disconnect drops it
    // and tears the channel down
    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let notification = subscription.recv().await?;
        let event = Event::default().json_data(&notification).ok()?;
        Some((Ok::<Event, Infallible>(event), subscription))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub fn get_student_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/student",
        Router::new()
            .route("/profile", get(get_profile))
            .route("/update_profile", post(update_profile))
            .route("/subtopics/{subtopic_id}/questions", get(questions))
            .route("/submit_quiz", post(submit_quiz))
            .route("/attempts", get(attempts))
            .route("/leaderboard", get(leaderboard))
            .route("/classes", get(my_classes))
            .route(
                "/notifications",
                get(notifications).delete(clear_notifications),
            )
            .route("/notifications/{id}/read", post(mark_read))
            .route("/notifications/read_all", post(mark_all_read))
            .route(
                "/notifications/{id}",
                axum::routing::delete(delete_notification),
            )
            .route("/notifications/stream", get(notification_stream)),
    )
}
