use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::error::Error;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ClassInfo {
    pub id: i64,
    pub name: String,
    pub teacher_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct RosterEntry {
    pub user_id: i64,
    pub display_name: String,
    pub username: String,
    pub photo_url: Option<String>,
}

/// Roster document as the portals consume it: the member id array plus a
/// per-member display map keyed by user id.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClassRoster {
    pub id: i64,
    pub name: String,
    pub teacher_id: i64,
    pub student_ids: Vec<i64>,
    pub roster: BTreeMap<String, RosterEntry>,
}

pub async fn create_class(db: &SqlitePool, teacher_id: i64, name: String) -> anyhow::Result<i64> {
    let id = sqlx::query("INSERT INTO class (name, teacher_id) VALUES (?, ?)")
        .bind(&name)
        .bind(teacher_id)
        .execute(db)
        .await?
        .last_insert_rowid();
    Ok(id)
}

/// Add a student, denormalizing their display card into the roster row.
/// The card is read and written in one transaction.
pub async fn add_student(db: &SqlitePool, class_id: i64, user_id: i64) -> anyhow::Result<()> {
    let mut tx = db.begin().await?;
    let card = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT display_name, username, photo_url FROM user WHERE id = ? AND role = 'student'",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((display_name, username, photo_url)) = card else {
        return Err(Error::NotFound.into());
    };
    sqlx::query(
        "INSERT OR REPLACE INTO class_member \
         (class_id, user_id, display_name, username, photo_url) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(class_id)
    .bind(user_id)
    .bind(&display_name)
    .bind(&username)
    .bind(&photo_url)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn remove_student(db: &SqlitePool, class_id: i64, user_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM class_member WHERE class_id = ? AND user_id = ?")
        .bind(class_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Re-sync every roster row for one member after a profile edit.
pub async fn sync_member_cards(db: &SqlitePool, user_id: i64) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE class_member SET \
         display_name = (SELECT display_name FROM user WHERE user.id = class_member.user_id), \
         username = (SELECT username FROM user WHERE user.id = class_member.user_id), \
         photo_url = (SELECT photo_url FROM user WHERE user.id = class_member.user_id) \
         WHERE user_id = ?",
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn get_roster(db: &SqlitePool, class_id: i64) -> anyhow::Result<ClassRoster> {
    let info = sqlx::query_as::<_, ClassInfo>(
        "SELECT id, name, teacher_id FROM class WHERE id = ?",
    )
    .bind(class_id)
    .fetch_optional(db)
    .await?
    .ok_or(Error::NotFound)?;
    let members = sqlx::query_as::<_, RosterEntry>(
        "SELECT user_id, display_name, username, photo_url FROM class_member \
         WHERE class_id = ? ORDER BY display_name",
    )
    .bind(class_id)
    .fetch_all(db)
    .await?;
    Ok(ClassRoster {
        id: info.id,
        name: info.name,
        teacher_id: info.teacher_id,
        student_ids: members.iter().map(|m| m.user_id).collect(),
        roster: members
            .into_iter()
            .map(|m| (m.user_id.to_string(), m))
            .collect(),
    })
}

pub async fn classes_of_teacher(db: &SqlitePool, teacher_id: i64) -> anyhow::Result<Vec<ClassInfo>> {
    let classes = sqlx::query_as::<_, ClassInfo>(
        "SELECT id, name, teacher_id FROM class WHERE teacher_id = ? ORDER BY name",
    )
    .bind(teacher_id)
    .fetch_all(db)
    .await?;
    Ok(classes)
}

pub async fn classes_of_student(db: &SqlitePool, user_id: i64) -> anyhow::Result<Vec<ClassInfo>> {
    let classes = sqlx::query_as::<_, ClassInfo>(
        "SELECT class.id, class.name, class.teacher_id FROM class \
         JOIN class_member ON class.id = class_member.class_id \
         WHERE class_member.user_id = ? ORDER BY class.name",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(classes)
}

/// The requesting teacher must own the class.
pub async fn assert_owned_by(db: &SqlitePool, class_id: i64, teacher_id: i64) -> anyhow::Result<()> {
    let owner = sqlx::query_scalar::<_, i64>("SELECT teacher_id FROM class WHERE id = ?")
        .bind(class_id)
        .fetch_optional(db)
        .await?
        .ok_or(Error::NotFound)?;
    if owner != teacher_id {
        return Err(Error::PermissionDenied.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::profile::{ProfileEdit, Role, create_test_user, update_profile};

    #[tokio::test]
    async fn roster_holds_ids_and_display_map() {
        let db = test_pool().await;
        let teacher = create_test_user(&db, "prof", Role::Teacher).await;
        let mia = create_test_user(&db, "mia", Role::Student).await;
        let noah = create_test_user(&db, "noah", Role::Student).await;
        let class_id = create_class(&db, teacher, "Algebra 101".into()).await.unwrap();
        add_student(&db, class_id, mia).await.unwrap();
        add_student(&db, class_id, noah).await.unwrap();

        let roster = get_roster(&db, class_id).await.unwrap();
        assert_eq!(roster.student_ids.len(), 2);
        assert_eq!(roster.roster[&mia.to_string()].username, "mia");

        remove_student(&db, class_id, noah).await.unwrap();
        let roster = get_roster(&db, class_id).await.unwrap();
        assert_eq!(roster.student_ids, vec![mia]);
    }

    #[tokio::test]
    async fn teachers_cannot_be_enrolled() {
        let db = test_pool().await;
        let teacher = create_test_user(&db, "prof", Role::Teacher).await;
        let other = create_test_user(&db, "prof2", Role::Teacher).await;
        let class_id = create_class(&db, teacher, "Algebra 101".into()).await.unwrap();
        let err = add_student(&db, class_id, other).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound)));
    }

    #[tokio::test]
    async fn profile_edit_resyncs_member_cards() {
        let db = test_pool().await;
        let teacher = create_test_user(&db, "prof", Role::Teacher).await;
        let mia = create_test_user(&db, "mia", Role::Student).await;
        let a = create_class(&db, teacher, "Algebra 101".into()).await.unwrap();
        let b = create_class(&db, teacher, "Geometry".into()).await.unwrap();
        add_student(&db, a, mia).await.unwrap();
        add_student(&db, b, mia).await.unwrap();

        update_profile(
            &db,
            mia,
            ProfileEdit {
                display_name: Some("Mia R.".into()),
                phone: None,
                location: None,
                school: None,
                photo_url: Some("https://img.example/mia.png".into()),
            },
        )
        .await
        .unwrap();

        for class_id in [a, b] {
            let roster = get_roster(&db, class_id).await.unwrap();
            let card = &roster.roster[&mia.to_string()];
            assert_eq!(card.display_name, "Mia R.");
            assert_eq!(card.photo_url.as_deref(), Some("https://img.example/mia.png"));
        }
    }

    #[tokio::test]
    async fn ownership_is_enforced() {
        let db = test_pool().await;
        let owner = create_test_user(&db, "prof", Role::Teacher).await;
        let intruder = create_test_user(&db, "prof2", Role::Teacher).await;
        let class_id = create_class(&db, owner, "Algebra 101".into()).await.unwrap();
        assert_owned_by(&db, class_id, owner).await.unwrap();
        let err = assert_owned_by(&db, class_id, intruder).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::PermissionDenied)
        ));
    }
}
