pub mod public;
pub mod student;
pub mod teacher;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::SqlitePool;
use tracing::error;

use crate::config::Config;
use crate::error::Error;
use crate::leaderboard::Leaderboards;
use crate::subscribe::NotificationHub;

pub const SESSION_USER: &str = "user_id";
pub const SESSION_ROLE: &str = "role";

pub struct AppState {
    pub db: SqlitePool,
    pub hub: NotificationHub,
    pub leaderboards: Leaderboards,
    pub config: Config,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Arc<Self> {
        let leaderboards = Leaderboards::new(
            db.clone(),
            std::time::Duration::from_secs(config.leaderboard_cache_seconds),
        );
        Arc::new(Self {
            db,
            hub: NotificationHub::new(),
            leaderboards,
            config,
        })
    }
}

/// Map a domain failure to a response. The distinguished conditions get
/// their status; anything else is logged and reported generically.
pub(crate) fn error_response(e: anyhow::Error) -> Response {
    let status = match e.downcast_ref::<Error>() {
        Some(Error::NotFound) => StatusCode::NOT_FOUND,
        Some(Error::PermissionDenied) => StatusCode::FORBIDDEN,
        Some(Error::InvalidCredentials) => StatusCode::BAD_REQUEST,
        Some(Error::UsernameTaken | Error::EmailTaken) => StatusCode::CONFLICT,
        Some(Error::InvalidUsername(_)) => StatusCode::BAD_REQUEST,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {e:#}");
        (status, "internal error".to_string()).into_response()
    } else {
        (status, e.to_string()).into_response()
    }
}
