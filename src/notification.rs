use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::error::Error;
use crate::subscribe::NotificationHub;
use crate::utils::utc_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationKind {
    Assignment,
    Submission,
    Request,
    Result,
    Alert,
    General,
}

/// A message addressed to one user. Created by a teacher action or a
/// system event; afterwards only the owner touches it (mark read, delete).
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert a notification and push it to any live subscription of the
/// addressee.
pub async fn create_notification(
    db: &SqlitePool,
    hub: &NotificationHub,
    user_id: i64,
    kind: NotificationKind,
    title: String,
    body: String,
    link: Option<String>,
) -> anyhow::Result<Notification> {
    let created_at = utc_now();
    let id = sqlx::query(
        "INSERT INTO notification (user_id, kind, title, body, link, read, created_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(user_id)
    .bind(kind)
    .bind(&title)
    .bind(&body)
    .bind(&link)
    .bind(created_at)
    .execute(db)
    .await?
    .last_insert_rowid();
    let notification = Notification {
        id,
        user_id,
        kind,
        title,
        body,
        link,
        read: false,
        created_at,
    };
    hub.publish(&notification);
    Ok(notification)
}

/// Newest first, capped at `page_size` per read.
pub async fn list_notifications(
    db: &SqlitePool,
    user_id: i64,
    page_size: usize,
) -> anyhow::Result<Vec<Notification>> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, kind, title, body, link, read, created_at FROM notification \
         WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(page_size as i64)
    .fetch_all(db)
    .await?;
    Ok(notifications)
}

pub async fn unread_count(db: &SqlitePool, user_id: i64) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification WHERE user_id = ? AND read = 0",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Mark one notification read. Owner-scoped: someone else's id is
/// indistinguishable from a missing one.
pub async fn mark_read(db: &SqlitePool, user_id: i64, id: i64) -> anyhow::Result<()> {
    let updated = sqlx::query("UPDATE notification SET read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::NotFound.into());
    }
    Ok(())
}

pub async fn mark_all_read(db: &SqlitePool, user_id: i64) -> anyhow::Result<()> {
    sqlx::query("UPDATE notification SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete_notification(db: &SqlitePool, user_id: i64, id: i64) -> anyhow::Result<()> {
    let deleted = sqlx::query("DELETE FROM notification WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(Error::NotFound.into());
    }
    Ok(())
}

/// Bulk clear: one statement, all-or-nothing.
pub async fn clear_notifications(db: &SqlitePool, user_id: i64) -> anyhow::Result<u64> {
    let deleted = sqlx::query("DELETE FROM notification WHERE user_id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(deleted.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::profile::{Role, create_test_user};

    async fn seed(db: &SqlitePool, hub: &NotificationHub, user_id: i64, n: usize) {
        for i in 0..n {
            create_notification(
                db,
                hub,
                user_id,
                NotificationKind::General,
                format!("title {i}"),
                "body".into(),
                None,
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn list_is_capped_and_newest_first() {
        let db = test_pool().await;
        let hub = NotificationHub::default();
        let id = create_test_user(&db, "mia", Role::Student).await;
        seed(&db, &hub, id, 55).await;

        let page = list_notifications(&db, id, 50).await.unwrap();
        assert_eq!(page.len(), 50);
        assert_eq!(page[0].title, "title 54");
        assert!(!page[0].read);
    }

    #[tokio::test]
    async fn read_flags_and_ownership() {
        let db = test_pool().await;
        let hub = NotificationHub::default();
        let mia = create_test_user(&db, "mia", Role::Student).await;
        let noah = create_test_user(&db, "noah", Role::Student).await;
        seed(&db, &hub, mia, 3).await;
        assert_eq!(unread_count(&db, mia).await.unwrap(), 3);

        let first = list_notifications(&db, mia, 50).await.unwrap()[0].id;
        mark_read(&db, mia, first).await.unwrap();
        assert_eq!(unread_count(&db, mia).await.unwrap(), 2);

        // another user cannot touch it
        let err = mark_read(&db, noah, first).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::Error>(),
            Some(crate::error::Error::NotFound)
        ));

        mark_all_read(&db, mia).await.unwrap();
        assert_eq!(unread_count(&db, mia).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_and_bulk_clear() {
        let db = test_pool().await;
        let hub = NotificationHub::default();
        let mia = create_test_user(&db, "mia", Role::Student).await;
        seed(&db, &hub, mia, 4).await;

        let first = list_notifications(&db, mia, 50).await.unwrap()[0].id;
        delete_notification(&db, mia, first).await.unwrap();
        assert_eq!(list_notifications(&db, mia, 50).await.unwrap().len(), 3);

        assert_eq!(clear_notifications(&db, mia).await.unwrap(), 3);
        assert!(list_notifications(&db, mia, 50).await.unwrap().is_empty());
    }
}
