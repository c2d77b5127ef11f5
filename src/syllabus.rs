use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use utoipa::ToSchema;

/// A position in the curriculum tree: topic, chapter, subtopic indices.
/// The derived `Ord` is lexicographic, which is exactly the high-watermark
/// comparison the stats updater needs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub struct CurriculumPosition {
    pub topic: i64,
    pub chapter: i64,
    pub subtopic: i64,
}

impl CurriculumPosition {
    pub fn new(topic: i64, chapter: i64, subtopic: i64) -> Self {
        Self {
            topic,
            chapter,
            subtopic,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TopicInfo {
    pub id: i64,
    pub idx: i64,
    pub title: String,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ChapterInfo {
    pub id: i64,
    pub topic_id: i64,
    pub idx: i64,
    pub title: String,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct SubtopicInfo {
    pub id: i64,
    pub chapter_id: i64,
    pub idx: i64,
    pub title: String,
}

pub async fn list_topics(db: &SqlitePool) -> anyhow::Result<Vec<TopicInfo>> {
    let topics = sqlx::query_as::<_, TopicInfo>("SELECT id, idx, title FROM topic ORDER BY idx")
        .fetch_all(db)
        .await?;
    Ok(topics)
}

pub async fn list_chapters(db: &SqlitePool, topic_id: i64) -> anyhow::Result<Vec<ChapterInfo>> {
    let chapters = sqlx::query_as::<_, ChapterInfo>(
        "SELECT id, topic_id, idx, title FROM chapter WHERE topic_id = ? ORDER BY idx",
    )
    .bind(topic_id)
    .fetch_all(db)
    .await?;
    Ok(chapters)
}

pub async fn list_subtopics(db: &SqlitePool, chapter_id: i64) -> anyhow::Result<Vec<SubtopicInfo>> {
    let subtopics = sqlx::query_as::<_, SubtopicInfo>(
        "SELECT id, chapter_id, idx, title FROM subtopic WHERE chapter_id = ? ORDER BY idx",
    )
    .bind(chapter_id)
    .fetch_all(db)
    .await?;
    Ok(subtopics)
}

/// Resolve a subtopic id to its (topic, chapter, subtopic) indices.
pub async fn position_of_subtopic(
    db: &SqlitePool,
    subtopic_id: i64,
) -> anyhow::Result<Option<CurriculumPosition>> {
    let row = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT topic.idx, chapter.idx, subtopic.idx FROM subtopic \
         JOIN chapter ON subtopic.chapter_id = chapter.id \
         JOIN topic ON chapter.topic_id = topic.id \
         WHERE subtopic.id = ?",
    )
    .bind(subtopic_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(topic, chapter, subtopic)| CurriculumPosition::new(topic, chapter, subtopic)))
}

#[derive(Debug, Deserialize)]
struct SyllabusFile {
    #[serde(default)]
    topic: Vec<TopicDef>,
}

#[derive(Debug, Deserialize)]
struct TopicDef {
    title: String,
    #[serde(default)]
    chapter: Vec<ChapterDef>,
}

#[derive(Debug, Deserialize)]
struct ChapterDef {
    title: String,
    #[serde(default)]
    subtopic: Vec<SubtopicDef>,
}

#[derive(Debug, Deserialize)]
struct SubtopicDef {
    title: String,
    #[serde(default)]
    question: Vec<QuestionDef>,
}

#[derive(Debug, Deserialize)]
struct QuestionDef {
    prompt: String,
    option_a: String,
    option_b: String,
    option_c: Option<String>,
    option_d: Option<String>,
    correct: String,
}

/// Load a syllabus TOML file into the database, replacing nothing that is
/// already present (indices are unique, duplicates fail the import).
pub async fn import_from_toml(db: &SqlitePool, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&path)?;
    let syllabus: SyllabusFile = toml::from_str(&content)?;
    import(db, syllabus).await?;
    info!("imported syllabus from {}", path.as_ref().display());
    Ok(())
}

async fn import(db: &SqlitePool, syllabus: SyllabusFile) -> anyhow::Result<()> {
    let mut tx = db.begin().await?;
    for (topic_idx, topic) in syllabus.topic.iter().enumerate() {
        let topic_id = sqlx::query("INSERT INTO topic (idx, title) VALUES (?, ?)")
            .bind(topic_idx as i64)
            .bind(&topic.title)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        for (chapter_idx, chapter) in topic.chapter.iter().enumerate() {
            let chapter_id =
                sqlx::query("INSERT INTO chapter (topic_id, idx, title) VALUES (?, ?, ?)")
                    .bind(topic_id)
                    .bind(chapter_idx as i64)
                    .bind(&chapter.title)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
            for (subtopic_idx, subtopic) in chapter.subtopic.iter().enumerate() {
                let subtopic_id =
                    sqlx::query("INSERT INTO subtopic (chapter_id, idx, title) VALUES (?, ?, ?)")
                        .bind(chapter_id)
                        .bind(subtopic_idx as i64)
                        .bind(&subtopic.title)
                        .execute(&mut *tx)
                        .await?
                        .last_insert_rowid();
                for (question_idx, question) in subtopic.question.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO quiz_question \
                         (subtopic_id, idx, prompt, option_a, option_b, option_c, option_d, correct) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(subtopic_id)
                    .bind(question_idx as i64)
                    .bind(&question.prompt)
                    .bind(&question.option_a)
                    .bind(&question.option_b)
                    .bind(&question.option_c)
                    .bind(&question.option_d)
                    .bind(question.correct.to_uppercase())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    const SAMPLE: &str = r#"
[[topic]]
title = "Algebra"

[[topic.chapter]]
title = "Linear Equations"

[[topic.chapter.subtopic]]
title = "One Variable"

[[topic.chapter.subtopic.question]]
prompt = "Solve x + 2 = 5"
option_a = "1"
option_b = "3"
option_c = "5"
correct = "b"

[[topic.chapter.subtopic]]
title = "Two Variables"

[[topic]]
title = "Geometry"
"#;

    #[test]
    fn position_ordering_is_lexicographic() {
        let stored = CurriculumPosition::new(1, 2, 3);
        assert!(CurriculumPosition::new(1, 2, 4) > stored);
        assert!(CurriculumPosition::new(2, 0, 0) > stored);
        assert!(CurriculumPosition::new(1, 2, 3) <= stored);
        assert!(CurriculumPosition::new(1, 2, 2) < stored);
        assert!(CurriculumPosition::new(0, 9, 9) < stored);
    }

    #[tokio::test]
    async fn import_and_browse() {
        let db = test_pool().await;
        let syllabus: SyllabusFile = toml::from_str(SAMPLE).unwrap();
        import(&db, syllabus).await.unwrap();

        let topics = list_topics(&db).await.unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].title, "Algebra");

        let chapters = list_chapters(&db, topics[0].id).await.unwrap();
        assert_eq!(chapters.len(), 1);
        let subtopics = list_subtopics(&db, chapters[0].id).await.unwrap();
        assert_eq!(subtopics.len(), 2);

        let position = position_of_subtopic(&db, subtopics[1].id).await.unwrap();
        assert_eq!(position, Some(CurriculumPosition::new(0, 0, 1)));
        assert_eq!(position_of_subtopic(&db, 999).await.unwrap(), None);
    }
}
