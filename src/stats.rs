use sqlx::SqlitePool;
use time::{Date, Duration, OffsetDateTime};
use tracing::debug;

use crate::leaderboard::PeriodKeys;
use crate::profile::Role;
use crate::syllabus::CurriculumPosition;
use crate::utils::{iso_date, utc_now};

/// Stored gamification state of one learner, as the updater sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyState {
    pub total_xp: i64,
    pub current_streak: i64,
    pub last_study_date: Option<Date>,
    pub progress: CurriculumPosition,
}

/// Fold one quiz-completion event into the state.
///
/// Streak: at most one increment per calendar day. A `last_study_date` of
/// yesterday continues the chain, anything older (or none) resets it to 1.
/// Progress: replaced only on strict lexicographic improvement.
pub fn apply_study_event(
    state: &mut StudyState,
    xp_earned: i64,
    completed: CurriculumPosition,
    today: Date,
) {
    let yesterday = today - Duration::days(1);
    match state.last_study_date {
        Some(last) if last == today => {}
        Some(last) if last == yesterday => state.current_streak += 1,
        _ => state.current_streak = 1,
    }
    if completed > state.progress {
        state.progress = completed;
    }
    state.total_xp += xp_earned;
    state.last_study_date = Some(today);
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    role: Role,
    display_name: String,
    total_xp: i64,
    current_streak: i64,
    last_study_date: Option<Date>,
    progress_topic: i64,
    progress_chapter: i64,
    progress_subtopic: i64,
}

/// Apply a quiz completion to a user's persisted stats.
///
/// Missing profiles are a silent no-op and teacher accounts are skipped;
/// gamification applies only to learners. The profile update, the daily
/// history increment and the four period leaderboard upserts commit in one
/// transaction. Attempt-once: a failed commit surfaces as a single error
/// with nothing applied.
pub async fn record_quiz_completion(
    db: &SqlitePool,
    user_id: i64,
    xp_earned: i64,
    completed: CurriculumPosition,
) -> anyhow::Result<()> {
    record_quiz_completion_at(db, user_id, xp_earned, completed, utc_now()).await
}

/// One clock read per invocation: the daily-history key and the period
/// bucket ids all derive from the same instant, so a transaction that
/// straddles UTC midnight cannot split them across two days.
async fn record_quiz_completion_at(
    db: &SqlitePool,
    user_id: i64,
    xp_earned: i64,
    completed: CurriculumPosition,
    now: OffsetDateTime,
) -> anyhow::Result<()> {
    let mut tx = db.begin().await?;
    let row = sqlx::query_as::<_, StatsRow>(
        "SELECT role, display_name, total_xp, current_streak, last_study_date, \
         progress_topic, progress_chapter, progress_subtopic FROM user WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(row) = row else {
        debug!("stats update for unknown user {user_id}, skipping");
        return Ok(());
    };
    if row.role == Role::Teacher {
        return Ok(());
    }

    let today = now.date();
    let mut state = StudyState {
        total_xp: row.total_xp,
        current_streak: row.current_streak,
        last_study_date: row.last_study_date,
        progress: CurriculumPosition::new(
            row.progress_topic,
            row.progress_chapter,
            row.progress_subtopic,
        ),
    };
    apply_study_event(&mut state, xp_earned, completed, today);

    sqlx::query(
        "UPDATE user SET total_xp = ?, current_streak = ?, last_study_date = ?, \
         progress_topic = ?, progress_chapter = ?, progress_subtopic = ? WHERE id = ?",
    )
    .bind(state.total_xp)
    .bind(state.current_streak)
    .bind(state.last_study_date)
    .bind(state.progress.topic)
    .bind(state.progress.chapter)
    .bind(state.progress.subtopic)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO daily_xp (user_id, day, xp) VALUES (?, ?, ?) \
         ON CONFLICT (user_id, day) DO UPDATE SET xp = xp + excluded.xp",
    )
    .bind(user_id)
    .bind(iso_date(today))
    .bind(xp_earned)
    .execute(&mut *tx)
    .await?;

    let keys = PeriodKeys::at(now);
    for period_id in keys.iter() {
        sqlx::query(
            "INSERT INTO leaderboard_entry (period_id, user_id, display_name, xp) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (period_id, user_id) DO UPDATE \
             SET xp = xp + excluded.xp, display_name = excluded.display_name",
        )
        .bind(period_id)
        .bind(user_id)
        .bind(&row.display_name)
        .bind(xp_earned)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
