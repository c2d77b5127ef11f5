/// Conditions the API layer distinguishes when mapping failures to
/// responses. Everything else stays an opaque `anyhow::Error` and is
/// surfaced as a single generic failure, with no retry or compensation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("email is already registered")]
    EmailTaken,
    #[error("invalid username: {0}")]
    InvalidUsername(String),
}
