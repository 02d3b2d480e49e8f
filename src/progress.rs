//! Progress ledger and unlock policy. One record per (student, chapter),
//! created lazily on first write, never deleted. Every write is a
//! single-field upsert keyed on the composite identity, so flows owned by
//! different roles cannot clobber each other's fields.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::auth::Principal;
use crate::curriculum;
use crate::error::Result;
use crate::policy;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct ProgressRecord {
    pub student_id: i64,
    pub chapter_id: i64,
    pub ebook_completed: bool,
    pub video_completed: bool,
    pub quiz_score: Option<i64>,
    pub practical_tasks_completed: bool,
    pub instructor_notes: String,
    pub updated_at: OffsetDateTime,
}

/// Which condition on the previous chapter unlocks the next one.
///
/// `ScorePresent` replicates the observed product behavior: any recorded quiz
/// score unlocks the next chapter, passing or not. `ScorePassing` is the
/// stricter rule, available as a configuration choice but off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockRule {
    #[default]
    ScorePresent,
    ScorePassing,
}

/// Per-chapter transcript row: the chapter joined with the student's ledger
/// record (all-absent when none exists) and the derived flags.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TranscriptEntry {
    pub chapter_id: i64,
    pub chapter_number: i64,
    pub chapter_title: String,
    pub ebook_completed: bool,
    pub video_completed: bool,
    pub quiz_score: Option<i64>,
    pub quiz_passed: Option<bool>,
    pub practical_tasks_completed: bool,
    pub instructor_notes: String,
    pub unlocked: bool,
}

/// The first chapter is always unlocked; chapter i is unlocked iff the
/// previous chapter's ledger record has a quiz score satisfying the rule.
/// A missing record counts as all-absent. Cheap on purpose: re-evaluated on
/// every chapter-list fetch, never cached.
pub fn is_unlocked(rule: UnlockRule, chapter_index: usize, prior: Option<&TranscriptEntry>) -> bool {
    if chapter_index == 0 {
        return true;
    }
    match (rule, prior) {
        (_, None) => false,
        (UnlockRule::ScorePresent, Some(p)) => p.quiz_score.is_some(),
        (UnlockRule::ScorePassing, Some(p)) => p.quiz_passed == Some(true),
    }
}

#[derive(sqlx::FromRow)]
struct TranscriptRow {
    chapter_id: i64,
    chapter_number: i64,
    chapter_title: String,
    ebook_completed: bool,
    video_completed: bool,
    quiz_score: Option<i64>,
    passing_score: Option<i64>,
    practical_tasks_completed: bool,
    instructor_notes: String,
}

/// The per-student transcript for a program, ordered by chapter number.
/// Explicit join-then-assemble: chapters LEFT JOIN ledger LEFT JOIN quiz,
/// then the unlock flag is derived sequentially in order.
pub async fn get_file(
    database: &SqlitePool,
    rule: UnlockRule,
    student_id: i64,
    program_id: i64,
) -> Result<Vec<TranscriptEntry>> {
    let rows = sqlx::query_as::<_, TranscriptRow>(
        "SELECT c.id AS chapter_id, c.chapter_number, c.title AS chapter_title, \
                COALESCE(p.ebook_completed, 0) AS ebook_completed, \
                COALESCE(p.video_completed, 0) AS video_completed, \
                p.quiz_score, q.passing_score, \
                COALESCE(p.practical_tasks_completed, 0) AS practical_tasks_completed, \
                COALESCE(p.instructor_notes, '') AS instructor_notes \
         FROM chapters c \
         LEFT JOIN progress p ON p.chapter_id = c.id AND p.student_id = ? \
         LEFT JOIN quizzes q ON q.chapter_id = c.id \
         WHERE c.program_id = ? \
         ORDER BY c.chapter_number ASC",
    )
    .bind(student_id)
    .bind(program_id)
    .fetch_all(database)
    .await?;

    let mut entries: Vec<TranscriptEntry> = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let quiz_passed = match (row.quiz_score, row.passing_score) {
            (Some(score), Some(passing)) => Some(score >= passing),
            _ => None,
        };
        let unlocked = is_unlocked(rule, index, entries.last());
        entries.push(TranscriptEntry {
            chapter_id: row.chapter_id,
            chapter_number: row.chapter_number,
            chapter_title: row.chapter_title,
            ebook_completed: row.ebook_completed,
            video_completed: row.video_completed,
            quiz_score: row.quiz_score,
            quiz_passed,
            practical_tasks_completed: row.practical_tasks_completed,
            instructor_notes: row.instructor_notes,
            unlocked,
        });
    }
    Ok(entries)
}

pub async fn get_record(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
) -> Result<Option<ProgressRecord>> {
    let record = sqlx::query_as::<_, ProgressRecord>(
        "SELECT student_id, chapter_id, ebook_completed, video_completed, quiz_score, \
                practical_tasks_completed, instructor_notes, updated_at \
         FROM progress WHERE student_id = ? AND chapter_id = ?",
    )
    .bind(student_id)
    .bind(chapter_id)
    .fetch_optional(database)
    .await?;
    Ok(record)
}

// Single-field upserts. The insert arm fills defaults for everything else;
// the update arm touches only the one column, so fields owned by other flows
// survive (the ledger is a partial-merge store, not record-replace).

pub async fn record_ebook_progress(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
    completed: bool,
) -> Result<()> {
    curriculum::get_chapter(database, chapter_id).await?;
    sqlx::query(
        "INSERT INTO progress (student_id, chapter_id, ebook_completed, updated_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (student_id, chapter_id) DO UPDATE SET \
         ebook_completed = excluded.ebook_completed, updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(chapter_id)
    .bind(completed)
    .bind(OffsetDateTime::now_utc())
    .execute(database)
    .await?;
    Ok(())
}

pub async fn record_video_progress(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
    completed: bool,
) -> Result<()> {
    curriculum::get_chapter(database, chapter_id).await?;
    sqlx::query(
        "INSERT INTO progress (student_id, chapter_id, video_completed, updated_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (student_id, chapter_id) DO UPDATE SET \
         video_completed = excluded.video_completed, updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(chapter_id)
    .bind(completed)
    .bind(OffsetDateTime::now_utc())
    .execute(database)
    .await?;
    Ok(())
}

pub(crate) async fn record_quiz_score(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
    score: i64,
) -> Result<()> {
    curriculum::get_chapter(database, chapter_id).await?;
    sqlx::query(
        "INSERT INTO progress (student_id, chapter_id, quiz_score, updated_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (student_id, chapter_id) DO UPDATE SET \
         quiz_score = excluded.quiz_score, updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(chapter_id)
    .bind(score)
    .bind(OffsetDateTime::now_utc())
    .execute(database)
    .await?;
    Ok(())
}

/// Instructor sign-off on practical tasks. The actor must be the student's
/// assigned instructor; anyone else gets `Forbidden`, not a generic error.
pub async fn record_practical(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
    completed: bool,
    actor: &Principal,
) -> Result<()> {
    policy::ensure_assigned_instructor(database, actor, student_id).await?;
    curriculum::get_chapter(database, chapter_id).await?;
    sqlx::query(
        "INSERT INTO progress (student_id, chapter_id, practical_tasks_completed, updated_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (student_id, chapter_id) DO UPDATE SET \
         practical_tasks_completed = excluded.practical_tasks_completed, \
         updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(chapter_id)
    .bind(completed)
    .bind(OffsetDateTime::now_utc())
    .execute(database)
    .await?;
    Ok(())
}

pub async fn annotate(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
    notes: String,
    actor: &Principal,
) -> Result<()> {
    policy::ensure_assigned_instructor(database, actor, student_id).await?;
    curriculum::get_chapter(database, chapter_id).await?;
    sqlx::query(
        "INSERT INTO progress (student_id, chapter_id, instructor_notes, updated_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (student_id, chapter_id) DO UPDATE SET \
         instructor_notes = excluded.instructor_notes, updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(chapter_id)
    .bind(notes)
    .bind(OffsetDateTime::now_utc())
    .execute(database)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::error::Error;
    use crate::test_util;

    async fn five_chapter_program(db: &SqlitePool) -> (i64, i64, Vec<i64>) {
        let school_id = test_util::seed_school(db).await;
        let program_id = test_util::seed_program(db, school_id).await;
        let mut chapter_ids = Vec::new();
        for n in 1..=5 {
            let id = test_util::seed_chapter(db, program_id, n).await;
            test_util::seed_quiz(db, id, 70).await;
            chapter_ids.push(id);
        }
        (school_id, program_id, chapter_ids)
    }

    #[tokio::test]
    async fn test_fresh_student_only_first_chapter_unlocked() {
        let db = test_util::memory_pool().await;
        let (school_id, program_id, _) = five_chapter_program(&db).await;
        let student_id = test_util::seed_user(&db, school_id, Role::Student, None).await;

        let file = get_file(&db, UnlockRule::ScorePresent, student_id, program_id)
            .await
            .unwrap();
        assert_eq!(file.len(), 5);
        let unlocked: Vec<bool> = file.iter().map(|e| e.unlocked).collect();
        assert_eq!(unlocked, vec![true, false, false, false, false]);
    }

    #[tokio::test]
    async fn test_any_score_unlocks_next_chapter() {
        let db = test_util::memory_pool().await;
        let (school_id, program_id, chapters) = five_chapter_program(&db).await;
        let student_id = test_util::seed_user(&db, school_id, Role::Student, None).await;

        // a failing score still unlocks under the lenient (observed) rule
        record_quiz_score(&db, student_id, chapters[0], 10).await.unwrap();
        let file = get_file(&db, UnlockRule::ScorePresent, student_id, program_id)
            .await
            .unwrap();
        assert!(file[1].unlocked);
        assert!(!file[2].unlocked);
        assert_eq!(file[0].quiz_passed, Some(false));

        // the strict rule requires a passing score
        let file = get_file(&db, UnlockRule::ScorePassing, student_id, program_id)
            .await
            .unwrap();
        assert!(!file[1].unlocked);
        record_quiz_score(&db, student_id, chapters[0], 90).await.unwrap();
        let file = get_file(&db, UnlockRule::ScorePassing, student_id, program_id)
            .await
            .unwrap();
        assert!(file[1].unlocked);
    }

    #[tokio::test]
    async fn test_quiz_score_does_not_clobber_other_fields() {
        let db = test_util::memory_pool().await;
        let (school_id, _, chapters) = five_chapter_program(&db).await;
        let instructor_id =
            test_util::seed_user(&db, school_id, Role::Instructor, None).await;
        let student_id =
            test_util::seed_user(&db, school_id, Role::Student, Some(instructor_id)).await;
        let instructor = Principal {
            id: instructor_id,
            school_id,
            role: Role::Instructor,
        };

        record_ebook_progress(&db, student_id, chapters[0], true)
            .await
            .unwrap();
        annotate(&db, student_id, chapters[0], "smooth clutch work".into(), &instructor)
            .await
            .unwrap();
        record_quiz_score(&db, student_id, chapters[0], 85).await.unwrap();

        let record = get_record(&db, student_id, chapters[0])
            .await
            .unwrap()
            .unwrap();
        assert!(record.ebook_completed);
        assert!(!record.video_completed);
        assert_eq!(record.quiz_score, Some(85));
        assert_eq!(record.instructor_notes, "smooth clutch work");
        assert!(!record.practical_tasks_completed);
    }

    #[tokio::test]
    async fn test_resubmission_last_score_wins() {
        let db = test_util::memory_pool().await;
        let (school_id, _, chapters) = five_chapter_program(&db).await;
        let student_id = test_util::seed_user(&db, school_id, Role::Student, None).await;

        record_quiz_score(&db, student_id, chapters[0], 90).await.unwrap();
        record_quiz_score(&db, student_id, chapters[0], 40).await.unwrap();
        let record = get_record(&db, student_id, chapters[0])
            .await
            .unwrap()
            .unwrap();
        // a later failing attempt overwrites an earlier passing one
        assert_eq!(record.quiz_score, Some(40));
    }

    #[tokio::test]
    async fn test_unassigned_instructor_is_forbidden() {
        let db = test_util::memory_pool().await;
        let (school_id, _, chapters) = five_chapter_program(&db).await;
        let assigned = test_util::seed_user(&db, school_id, Role::Instructor, None).await;
        let other = test_util::seed_user(&db, school_id, Role::Instructor, None).await;
        let student_id = test_util::seed_user(&db, school_id, Role::Student, Some(assigned)).await;

        let stranger = Principal {
            id: other,
            school_id,
            role: Role::Instructor,
        };
        let err = record_practical(&db, student_id, chapters[0], true, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
        assert!(get_record(&db, student_id, chapters[0]).await.unwrap().is_none());

        let assigned = Principal {
            id: assigned,
            school_id,
            role: Role::Instructor,
        };
        record_practical(&db, student_id, chapters[0], true, &assigned)
            .await
            .unwrap();
        let record = get_record(&db, student_id, chapters[0])
            .await
            .unwrap()
            .unwrap();
        assert!(record.practical_tasks_completed);
    }
}
