use std::collections::BTreeMap;
use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::Date;
use tracing::warn;
use utoipa::ToSchema;

use crate::class;
use crate::error::Error;
use crate::syllabus::CurriculumPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

/// Gamification block of a profile. `progress` is a high-watermark that
/// never regresses; `daily_history` maps ISO dates to XP earned that day.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GamificationStats {
    pub total_xp: i64,
    pub current_streak: i64,
    pub last_study_date: Option<Date>,
    pub daily_history: BTreeMap<String, i64>,
    pub progress: CurriculumPosition,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub school: Option<String>,
    pub photo_url: Option<String>,
    pub stats: GamificationStats,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    display_name: String,
    role: Role,
    phone: Option<String>,
    location: Option<String>,
    school: Option<String>,
    photo_url: Option<String>,
    total_xp: i64,
    current_streak: i64,
    last_study_date: Option<Date>,
    progress_topic: i64,
    progress_chapter: i64,
    progress_subtopic: i64,
}

const USER_COLUMNS: &str = "id, email, username, display_name, role, phone, location, school, \
     photo_url, total_xp, current_streak, last_study_date, \
     progress_topic, progress_chapter, progress_subtopic";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9_]{3,20}$").expect("valid regex"));

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// Create a profile and its username reservation in one transaction.
/// The reservation row is what makes usernames globally unique.
pub async fn signup(db: &SqlitePool, req: SignupRequest) -> anyhow::Result<i64> {
    let username = req.username.trim().to_lowercase();
    if !USERNAME_RE.is_match(&username) {
        return Err(Error::InvalidUsername(username).into());
    }
    let password_hash = hash_password(&req.password)?;

    let mut tx = db.begin().await?;
    let result = sqlx::query(
        "INSERT INTO user (email, username, display_name, password, role) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&req.email)
    .bind(&username)
    .bind(&req.display_name)
    .bind(&password_hash)
    .bind(req.role)
    .execute(&mut *tx)
    .await;
    let user_id = match result {
        Ok(done) => done.last_insert_rowid(),
        Err(e) => return Err(map_unique_violation(e)),
    };
    if let Err(e) = sqlx::query("INSERT INTO username_reservation (username, user_id) VALUES (?, ?)")
        .bind(&username)
        .bind(user_id)
        .execute(&mut *tx)
        .await
    {
        return Err(map_unique_violation(e));
    }
    tx.commit().await?;
    Ok(user_id)
}

fn map_unique_violation(e: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            if db_err.message().contains("email") {
                return Error::EmailTaken.into();
            }
            return Error::UsernameTaken.into();
        }
    }
    e.into()
}

/// Check whether a username is still free. A backend refusal on this read
/// is deliberately treated as "available" so signup is never blocked by it;
/// the reservation insert still enforces real uniqueness.
pub async fn username_available(db: &SqlitePool, username: &str) -> bool {
    let username = username.trim().to_lowercase();
    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM username_reservation WHERE username = ?",
    )
    .bind(&username)
    .fetch_one(db)
    .await;
    match taken {
        Ok(n) => n == 0,
        Err(e) => {
            warn!("username availability check failed, assuming available: {e}");
            true
        }
    }
}

pub async fn login(db: &SqlitePool, email: String, password: String) -> anyhow::Result<(i64, Role)> {
    let row = sqlx::query_as::<_, (i64, String, Role)>(
        "SELECT id, password, role FROM user WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(db)
    .await?;
    let Some((id, stored_hash, role)) = row else {
        return Err(Error::InvalidCredentials.into());
    };
    let parsed_hash = PasswordHash::new(&stored_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| Error::InvalidCredentials)?;
    Ok((id, role))
}

pub async fn get_profile(db: &SqlitePool, user_id: i64) -> anyhow::Result<UserProfile> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM user WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(Error::NotFound)?;
    let daily: Vec<(String, i64)> =
        sqlx::query_as("SELECT day, xp FROM daily_xp WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(db)
            .await?;
    Ok(UserProfile {
        id: row.id,
        email: row.email,
        username: row.username,
        display_name: row.display_name,
        role: row.role,
        phone: row.phone,
        location: row.location,
        school: row.school,
        photo_url: row.photo_url,
        stats: GamificationStats {
            total_xp: row.total_xp,
            current_streak: row.current_streak,
            last_study_date: row.last_study_date,
            daily_history: daily.into_iter().collect(),
            progress: CurriculumPosition::new(
                row.progress_topic,
                row.progress_chapter,
                row.progress_subtopic,
            ),
        },
    })
}

/// Full replacement of the editable profile block, not a patch: an
/// omitted contact field (`phone`, `location`, `school`, `photo_url`) is
/// cleared. Only `display_name` is kept when absent, since a profile
/// always has one.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileEdit {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub school: Option<String>,
    pub photo_url: Option<String>,
}

/// Apply a profile edit, then re-sync the member card of every class the
/// user belongs to.
pub async fn update_profile(db: &SqlitePool, user_id: i64, edit: ProfileEdit) -> anyhow::Result<()> {
    let updated = sqlx::query(
        "UPDATE user SET display_name = COALESCE(?, display_name), \
         phone = ?, location = ?, school = ?, photo_url = ? WHERE id = ?",
    )
    .bind(&edit.display_name)
    .bind(&edit.phone)
    .bind(&edit.location)
    .bind(&edit.school)
    .bind(&edit.photo_url)
    .bind(user_id)
    .execute(db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::NotFound.into());
    }
    class::sync_member_cards(db, user_id).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn create_test_user(
    db: &SqlitePool,
    username: &str,
    role: Role,
) -> i64 {
    signup(
        db,
        SignupRequest {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            display_name: username.to_string(),
            password: "secret123".to_string(),
            role,
        },
    )
    .await
    .unwrap()
}
