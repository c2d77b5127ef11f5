use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;

/// Canonical bucket identifiers for the four ranking periods, derived
/// from a single UTC instant. Pure and deterministic: the same instant
/// always yields the same four keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodKeys {
    pub day: String,
    pub week: String,
    pub month: String,
    pub all: String,
}

impl PeriodKeys {
    pub fn at(instant: OffsetDateTime) -> Self {
        let date = instant.to_offset(time::UtcOffset::UTC).date();
        Self {
            day: format!(
                "day_{}_{:02}_{:02}",
                date.year(),
                date.month() as u8,
                date.day()
            ),
            week: format!("week_{}_{:02}", date.year(), week_number(date)),
            month: format!("month_{}_{:02}", date.year(), date.month() as u8),
            all: "all_time".to_string(),
        }
    }

    pub fn now() -> Self {
        Self::at(crate::utils::utc_now())
    }

    pub fn iter(&self) -> [&str; 4] {
        [&self.day, &self.week, &self.month, &self.all]
    }
}

/// Week-of-year as the external aggregation pipeline computes it: days
/// elapsed since January 1 plus the weekday index (Sunday = 0) of
/// January 1 plus one, ceil-divided by 7. Deliberately NOT ISO-8601 —
/// bucket ids must match what the producer writes, quirks included.
fn week_number(date: Date) -> i64 {
    let jan1 = Date::from_ordinal_date(date.year(), 1).expect("jan 1 exists");
    let days_since_jan1 = i64::from(date.ordinal()) - 1;
    let jan1_weekday = i64::from(jan1.weekday().number_days_from_sunday());
    let x = days_since_jan1 + jan1_weekday + 1;
    (x + 6) / 7
}

/// Which bucket a client asks for; resolved against the current instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    All,
}

impl Period {
    pub fn resolve(self, keys: &PeriodKeys) -> &str {
        match self {
            Period::Day => &keys.day,
            Period::Week => &keys.week,
            Period::Month => &keys.month,
            Period::All => &keys.all,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub display_name: String,
    pub xp: i64,
}

/// The requester's own standing. `Beyond(n)` means "present in the bucket
/// but outside the fetched top-n window" — the exact position is never
/// computed, that would take a full bucket scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "n")]
pub enum Rank {
    Exact(usize),
    Beyond(usize),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Standings {
    pub period_id: String,
    pub entries: Vec<LeaderboardEntry>,
    /// Absent when the requester has no entry in this bucket.
    pub my_rank: Option<Rank>,
}

/// Read side of the period-scoped ranking collections. Top pages are
/// served through a short-TTL cache; the requester's point lookup is not
/// cached.
#[derive(Clone)]
pub struct Leaderboards {
    db: SqlitePool,
    top_cache: Cache<(String, usize), Arc<Vec<LeaderboardEntry>>>,
}

impl Leaderboards {
    pub fn new(db: SqlitePool, cache_ttl: Duration) -> Self {
        Self {
            db,
            top_cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    async fn top(&self, period_id: &str, limit: usize) -> anyhow::Result<Arc<Vec<LeaderboardEntry>>> {
        let db = self.db.clone();
        let key = (period_id.to_string(), limit);
        let period_id = period_id.to_string();
        self.top_cache
            .try_get_with(key, async move {
                let entries = sqlx::query_as::<_, LeaderboardEntry>(
                    "SELECT user_id, display_name, xp FROM leaderboard_entry \
                     WHERE period_id = ? ORDER BY xp DESC, user_id ASC LIMIT ?",
                )
                .bind(&period_id)
                .bind(limit as i64)
                .fetch_all(&db)
                .await?;
                Ok::<_, anyhow::Error>(Arc::new(entries))
            })
            .await
            .map_err(|e: Arc<anyhow::Error>| anyhow::anyhow!("leaderboard fetch failed: {e}"))
    }

    /// Top `limit` entries of a bucket plus the viewer's own rank: their
    /// 1-based position when inside the window, `Beyond(limit)` when the
    /// bucket holds an entry for them outside it, `None` otherwise.
    pub async fn standings(
        &self,
        period_id: &str,
        viewer: i64,
        limit: usize,
    ) -> anyhow::Result<Standings> {
        let top = self.top(period_id, limit).await?;
        let my_rank = match top.iter().position(|e| e.user_id == viewer) {
            Some(i) => Some(Rank::Exact(i + 1)),
            None => {
                let present = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM leaderboard_entry WHERE period_id = ? AND user_id = ?",
                )
                .bind(period_id)
                .bind(viewer)
                .fetch_one(&self.db)
                .await?;
                (present > 0).then_some(Rank::Beyond(limit))
            }
        };
        Ok(Standings {
            period_id: period_id.to_string(),
            entries: top.as_ref().clone(),
            my_rank,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use time::macros::datetime;

    #[test]
    fn keys_for_known_instant() {
        let keys = PeriodKeys::at(datetime!(2025-03-15 10:00 UTC));
        assert_eq!(keys.day, "day_2025_03_15");
        assert_eq!(keys.week, "week_2025_11");
        assert_eq!(keys.month, "month_2025_03");
        assert_eq!(keys.all, "all_time");
    }

    #[test]
    fn keys_are_deterministic_within_an_instant() {
        let instant = datetime!(2024-07-01 23:59:59 UTC);
        assert_eq!(PeriodKeys::at(instant), PeriodKeys::at(instant));
    }

    #[test]
    fn keys_normalize_to_utc() {
        // 01:30+02:00 is still the previous UTC day
        let keys = PeriodKeys::at(datetime!(2025-03-16 01:30 +02:00));
        assert_eq!(keys.day, "day_2025_03_15");
    }

    #[test]
    fn week_numbering_matches_the_producer_formula() {
        use time::macros::date;
        // Jan 1 2025 is a Wednesday (weekday index 3 from Sunday)
        assert_eq!(week_number(date!(2025 - 01 - 01)), 1);
        assert_eq!(week_number(date!(2025 - 01 - 05)), 2);
        assert_eq!(week_number(date!(2025 - 03 - 15)), 11);
        assert_eq!(week_number(date!(2025 - 12 - 31)), 53);
    }

    async fn seed(db: &SqlitePool, period_id: &str, users: &[(i64, &str, i64)]) {
        for (user_id, name, xp) in users {
            sqlx::query(
                "INSERT INTO leaderboard_entry (period_id, user_id, display_name, xp) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(period_id)
            .bind(user_id)
            .bind(name)
            .bind(xp)
            .execute(db)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn rank_resolution() {
        let db = test_pool().await;
        seed(
            &db,
            "day_2025_03_15",
            &[
                (1, "Ana", 500),
                (2, "Ben", 400),
                (3, "Caro", 300),
                (4, "Dan", 200),
                (5, "Eve", 100),
            ],
        )
        .await;
        let boards = Leaderboards::new(db, Duration::from_secs(10));

        // inside the window: 1-based position
        let s = boards.standings("day_2025_03_15", 3, 3).await.unwrap();
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.my_rank, Some(Rank::Exact(3)));

        // in the bucket but below the window: overflow marker, not a scan
        let s = boards.standings("day_2025_03_15", 5, 3).await.unwrap();
        assert_eq!(s.my_rank, Some(Rank::Beyond(3)));

        // with a wider window the same user gets an exact rank
        let s = boards.standings("day_2025_03_15", 5, 50).await.unwrap();
        assert_eq!(s.my_rank, Some(Rank::Exact(5)));

        // no entry in the bucket: no personal rank
        let s = boards.standings("day_2025_03_15", 42, 3).await.unwrap();
        assert_eq!(s.my_rank, None);

        // empty bucket
        let s = boards.standings("day_2024_01_01", 1, 3).await.unwrap();
        assert!(s.entries.is_empty());
        assert_eq!(s.my_rank, None);
    }

    #[tokio::test]
    async fn top_is_ordered_by_xp_descending() {
        let db = test_pool().await;
        seed(
            &db,
            "all_time",
            &[(1, "Ana", 10), (2, "Ben", 30), (3, "Caro", 20)],
        )
        .await;
        let boards = Leaderboards::new(db, Duration::from_secs(10));
        let s = boards.standings("all_time", 2, 50).await.unwrap();
        let names: Vec<_> = s.entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, ["Ben", "Caro", "Ana"]);
        assert_eq!(s.my_rank, Some(Rank::Exact(1)));
    }
}
