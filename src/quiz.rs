use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::error::Error;
use crate::stats;
use crate::syllabus;
use crate::utils::utc_now;

/// XP awarded per correctly answered question.
pub const XP_PER_CORRECT: i64 = 10;

/// A question as shown to the student: no correct answer included.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct QuestionView {
    pub id: i64,
    pub idx: i64,
    pub prompt: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
}

pub async fn questions_for_subtopic(
    db: &SqlitePool,
    subtopic_id: i64,
) -> anyhow::Result<Vec<QuestionView>> {
    let questions = sqlx::query_as::<_, QuestionView>(
        "SELECT id, idx, prompt, option_a, option_b, option_c, option_d \
         FROM quiz_question WHERE subtopic_id = ? ORDER BY idx",
    )
    .bind(subtopic_id)
    .fetch_all(db)
    .await?;
    Ok(questions)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuizSubmission {
    pub subtopic_id: i64,
    /// question id -> chosen option letter ("A".."D")
    pub answers: Vec<Answer>,
    pub class_id: Option<i64>,
    pub assignment_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct Answer {
    pub question_id: i64,
    pub choice: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuizResult {
    pub attempt_id: i64,
    pub score: i64,
    pub total_questions: i64,
    pub xp_earned: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttemptInfo {
    pub id: i64,
    pub user_id: i64,
    pub subtopic_id: i64,
    pub class_id: Option<i64>,
    pub assignment_id: Option<i64>,
    pub score: i64,
    pub total_questions: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

/// Score a submission, record the attempt, and feed the gamification
/// updater. Scoring compares against every question of the subtopic, so
/// unanswered questions count as wrong.
pub async fn submit_quiz(
    db: &SqlitePool,
    user_id: i64,
    submission: QuizSubmission,
) -> anyhow::Result<QuizResult> {
    let key: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, correct FROM quiz_question WHERE subtopic_id = ?")
            .bind(submission.subtopic_id)
            .fetch_all(db)
            .await?;
    if key.is_empty() {
        return Err(Error::NotFound.into());
    }
    let position = syllabus::position_of_subtopic(db, submission.subtopic_id)
        .await?
        .ok_or(Error::NotFound)?;

    let total_questions = key.len() as i64;
    let score = key
        .iter()
        .filter(|(id, correct)| {
            submission
                .answers
                .iter()
                .any(|a| a.question_id == *id && a.choice.eq_ignore_ascii_case(correct))
        })
        .count() as i64;
    let xp_earned = score * XP_PER_CORRECT;

    let attempt_id = sqlx::query(
        "INSERT INTO attempt \
         (user_id, subtopic_id, class_id, assignment_id, score, total_questions, submitted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(submission.subtopic_id)
    .bind(submission.class_id)
    .bind(submission.assignment_id)
    .bind(score)
    .bind(total_questions)
    .bind(utc_now())
    .execute(db)
    .await?
    .last_insert_rowid();

    stats::record_quiz_completion(db, user_id, xp_earned, position).await?;

    Ok(QuizResult {
        attempt_id,
        score,
        total_questions,
        xp_earned,
    })
}

/// A student's own attempt history, newest first.
pub async fn attempts_of_user(db: &SqlitePool, user_id: i64) -> anyhow::Result<Vec<AttemptInfo>> {
    let attempts = sqlx::query_as::<_, AttemptInfo>(
        "SELECT id, user_id, subtopic_id, class_id, assignment_id, score, total_questions, \
         submitted_at FROM attempt WHERE user_id = ? ORDER BY submitted_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(attempts)
}

/// All attempts by members of a class, newest first (teacher view).
pub async fn attempts_of_class(db: &SqlitePool, class_id: i64) -> anyhow::Result<Vec<AttemptInfo>> {
    let attempts = sqlx::query_as::<_, AttemptInfo>(
        "SELECT attempt.id, attempt.user_id, subtopic_id, attempt.class_id, assignment_id, \
         score, total_questions, submitted_at FROM attempt \
         JOIN class_member ON attempt.user_id = class_member.user_id \
         WHERE class_member.class_id = ? ORDER BY submitted_at DESC, attempt.id DESC",
    )
    .bind(class_id)
    .fetch_all(db)
    .await?;
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::profile::{Role, create_test_user, get_profile};
    use crate::syllabus::CurriculumPosition;

    async fn seed_syllabus(db: &SqlitePool) -> i64 {
        sqlx::query("INSERT INTO topic (id, idx, title) VALUES (1, 0, 'Algebra')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO chapter (id, topic_id, idx, title) VALUES (1, 1, 1, 'Linear')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO subtopic (id, chapter_id, idx, title) VALUES (1, 1, 2, 'Slopes')")
            .execute(db)
            .await
            .unwrap();
        for (idx, correct) in [(0, "A"), (1, "B"), (2, "C")] {
            sqlx::query(
                "INSERT INTO quiz_question \
                 (subtopic_id, idx, prompt, option_a, option_b, option_c, option_d, correct) \
                 VALUES (1, ?, 'q', 'a', 'b', 'c', 'd', ?)",
            )
            .bind(idx)
            .bind(correct)
            .execute(db)
            .await
            .unwrap();
        }
        1
    }

    #[tokio::test]
    async fn question_views_hide_the_answer_key() {
        let db = test_pool().await;
        let subtopic = seed_syllabus(&db).await;
        let questions = questions_for_subtopic(&db, subtopic).await.unwrap();
        assert_eq!(questions.len(), 3);
        let json = serde_json::to_string(&questions).unwrap();
        assert!(!json.contains("correct"));
    }

    #[tokio::test]
    async fn scoring_awards_xp_and_advances_stats() {
        let db = test_pool().await;
        let subtopic = seed_syllabus(&db).await;
        let mia = create_test_user(&db, "mia", Role::Student).await;
        let questions = questions_for_subtopic(&db, subtopic).await.unwrap();

        let result = submit_quiz(
            &db,
            mia,
            QuizSubmission {
                subtopic_id: subtopic,
                answers: vec![
                    Answer {
                        question_id: questions[0].id,
                        choice: "a".into(),
                    },
                    Answer {
                        question_id: questions[1].id,
                        choice: "D".into(),
                    },
                    // third question left unanswered
                ],
                class_id: None,
                assignment_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.total_questions, 3);
        assert_eq!(result.xp_earned, XP_PER_CORRECT);

        let profile = get_profile(&db, mia).await.unwrap();
        assert_eq!(profile.stats.total_xp, XP_PER_CORRECT);
        // subtopic 1 sits at indices (0, 1, 2)
        assert_eq!(profile.stats.progress, CurriculumPosition::new(0, 1, 2));

        let attempts = attempts_of_user(&db, mia).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].score, 1);
    }

    #[tokio::test]
    async fn unknown_subtopic_is_not_found() {
        let db = test_pool().await;
        let mia = create_test_user(&db, "mia", Role::Student).await;
        let err = submit_quiz(
            &db,
            mia,
            QuizSubmission {
                subtopic_id: 42,
                answers: vec![],
                class_id: None,
                assignment_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound)));
    }

    #[tokio::test]
    async fn class_attempt_feed_covers_members() {
        let db = test_pool().await;
        let subtopic = seed_syllabus(&db).await;
        let teacher = create_test_user(&db, "prof", Role::Teacher).await;
        let mia = create_test_user(&db, "mia", Role::Student).await;
        let noah = create_test_user(&db, "noah", Role::Student).await;
        let class_id = crate::class::create_class(&db, teacher, "Algebra 101".into())
            .await
            .unwrap();
        crate::class::add_student(&db, class_id, mia).await.unwrap();

        for user in [mia, noah] {
            submit_quiz(
                &db,
                user,
                QuizSubmission {
                    subtopic_id: subtopic,
                    answers: vec![],
                    class_id: Some(class_id),
                    assignment_id: None,
                },
            )
            .await
            .unwrap();
        }
        // only mia is enrolled, so only her attempt shows up
        let attempts = attempts_of_class(&db, class_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].user_id, mia);
    }
}
