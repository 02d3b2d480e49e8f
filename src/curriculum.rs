use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Program {
    pub id: i64,
    pub school_id: i64,
    pub name: String,
    pub license_type: String,
    pub total_chapters: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Chapter {
    pub id: i64,
    pub program_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub ebook_url: String,
    pub video_url: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewChapter {
    pub chapter_number: i64,
    pub title: String,
    #[serde(default)]
    pub ebook_url: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct QuizQuestion {
    pub question: String,
    /// Exactly four answer options.
    pub options: Vec<String>,
    /// Must match one of `options` exactly. Never exposed to students.
    pub correct_answer: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Quiz {
    pub id: i64,
    pub chapter_id: i64,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub passing_score: i64,
}

#[derive(sqlx::FromRow)]
struct QuizRow {
    id: i64,
    chapter_id: i64,
    title: String,
    questions: String,
    passing_score: i64,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = Error;

    fn try_from(row: QuizRow) -> Result<Self> {
        let questions = serde_json::from_str(&row.questions)
            .map_err(|e| Error::Unexpected(anyhow::anyhow!("malformed quiz questions: {e}")))?;
        Ok(Quiz {
            id: row.id,
            chapter_id: row.chapter_id,
            title: row.title,
            questions,
            passing_score: row.passing_score,
        })
    }
}

pub async fn create_program(
    database: &SqlitePool,
    school_id: i64,
    name: String,
    license_type: String,
    total_chapters: i64,
) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(Error::validation("program name is required"));
    }
    let result = sqlx::query(
        "INSERT INTO programs (school_id, name, license_type, total_chapters) VALUES (?, ?, ?, ?)",
    )
    .bind(school_id)
    .bind(name)
    .bind(license_type)
    .bind(total_chapters)
    .execute(database)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_programs(database: &SqlitePool, school_id: i64) -> Result<Vec<Program>> {
    let programs = sqlx::query_as::<_, Program>(
        "SELECT id, school_id, name, license_type, total_chapters FROM programs \
         WHERE school_id = ? ORDER BY name ASC",
    )
    .bind(school_id)
    .fetch_all(database)
    .await?;
    Ok(programs)
}

pub async fn get_program(database: &SqlitePool, id: i64) -> Result<Program> {
    sqlx::query_as::<_, Program>(
        "SELECT id, school_id, name, license_type, total_chapters FROM programs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("program"))
}

pub async fn update_program(
    database: &SqlitePool,
    id: i64,
    name: String,
    license_type: String,
    total_chapters: i64,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("program name is required"));
    }
    let result = sqlx::query(
        "UPDATE programs SET name = ?, license_type = ?, total_chapters = ? WHERE id = ?",
    )
    .bind(name)
    .bind(license_type)
    .bind(total_chapters)
    .bind(id)
    .execute(database)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound("program"));
    }
    Ok(())
}

/// Chapter numbers are unique per program but need not be contiguous; a
/// duplicate surfaces as `Conflict` and leaves the program untouched.
pub async fn create_chapter(
    database: &SqlitePool,
    program_id: i64,
    chapter: NewChapter,
) -> Result<i64> {
    if chapter.chapter_number < 1 {
        return Err(Error::validation("chapter_number must be positive"));
    }
    if chapter.title.trim().is_empty() {
        return Err(Error::validation("chapter title is required"));
    }
    get_program(database, program_id).await?;
    let number = chapter.chapter_number;
    let result = sqlx::query(
        "INSERT INTO chapters (program_id, chapter_number, title, ebook_url, video_url, duration_minutes) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(program_id)
    .bind(chapter.chapter_number)
    .bind(chapter.title)
    .bind(chapter.ebook_url)
    .bind(chapter.video_url)
    .bind(chapter.duration_minutes)
    .execute(database)
    .await
    .map_err(|e| match Error::from(e) {
        Error::Conflict(_) => {
            Error::conflict(format!("chapter {number} already exists in this program"))
        }
        other => other,
    })?;
    Ok(result.last_insert_rowid())
}

pub async fn list_chapters(database: &SqlitePool, program_id: i64) -> Result<Vec<Chapter>> {
    let chapters = sqlx::query_as::<_, Chapter>(
        "SELECT id, program_id, chapter_number, title, ebook_url, video_url, duration_minutes \
         FROM chapters WHERE program_id = ? ORDER BY chapter_number ASC",
    )
    .bind(program_id)
    .fetch_all(database)
    .await?;
    Ok(chapters)
}

pub async fn get_chapter(database: &SqlitePool, id: i64) -> Result<Chapter> {
    sqlx::query_as::<_, Chapter>(
        "SELECT id, program_id, chapter_number, title, ebook_url, video_url, duration_minutes \
         FROM chapters WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("chapter"))
}

pub fn validate_quiz(questions: &[QuizQuestion], passing_score: i64) -> Result<()> {
    if questions.is_empty() {
        return Err(Error::validation("a quiz must have at least one question"));
    }
    if !(0..=100).contains(&passing_score) {
        return Err(Error::validation("passing_score must be between 0 and 100"));
    }
    for (i, q) in questions.iter().enumerate() {
        if q.options.len() != 4 {
            return Err(Error::validation(format!(
                "question {i} must have exactly 4 options"
            )));
        }
        if !q.options.contains(&q.correct_answer) {
            return Err(Error::validation(format!(
                "question {i}: correct_answer must be one of the options"
            )));
        }
    }
    Ok(())
}

/// At most one quiz per chapter. Re-saving replaces the previous quiz, keyed
/// on `chapter_id`.
pub async fn upsert_quiz(
    database: &SqlitePool,
    chapter_id: i64,
    title: String,
    questions: Vec<QuizQuestion>,
    passing_score: i64,
) -> Result<i64> {
    validate_quiz(&questions, passing_score)?;
    get_chapter(database, chapter_id).await?;
    let questions_json = serde_json::to_string(&questions)
        .map_err(|e| Error::Unexpected(e.into()))?;
    sqlx::query(
        "INSERT INTO quizzes (chapter_id, title, questions, passing_score) VALUES (?, ?, ?, ?) \
         ON CONFLICT (chapter_id) DO UPDATE SET \
         title = excluded.title, questions = excluded.questions, \
         passing_score = excluded.passing_score",
    )
    .bind(chapter_id)
    .bind(title)
    .bind(questions_json)
    .bind(passing_score)
    .execute(database)
    .await?;
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM quizzes WHERE chapter_id = ?")
        .bind(chapter_id)
        .fetch_one(database)
        .await?;
    Ok(id)
}

pub async fn get_quiz(database: &SqlitePool, chapter_id: i64) -> Result<Option<Quiz>> {
    let row = sqlx::query_as::<_, QuizRow>(
        "SELECT id, chapter_id, title, questions, passing_score FROM quizzes WHERE chapter_id = ?",
    )
    .bind(chapter_id)
    .fetch_optional(database)
    .await?;
    row.map(Quiz::try_from).transpose()
}
