use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::auth::{self, Role};
use crate::curriculum::{self, NewChapter, QuizQuestion};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub async fn memory_pool() -> SqlitePool {
    // one connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

pub async fn seed_school(db: &SqlitePool) -> i64 {
    let n = unique();
    sqlx::query("INSERT INTO schools (name, email, phone) VALUES (?, ?, '')")
        .bind(format!("School {n}"))
        .bind(format!("school{n}@example.com"))
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn seed_user(
    db: &SqlitePool,
    school_id: i64,
    role: Role,
    instructor_id: Option<i64>,
) -> i64 {
    let n = unique();
    auth::create_user(
        db,
        school_id,
        role,
        format!("User {n}"),
        format!("user{n}@example.com"),
        "secret1".into(),
        instructor_id,
    )
    .await
    .unwrap()
}

pub async fn seed_program(db: &SqlitePool, school_id: i64) -> i64 {
    let n = unique();
    curriculum::create_program(db, school_id, format!("Program {n}"), "B".into(), 5)
        .await
        .unwrap()
}

pub async fn seed_chapter(db: &SqlitePool, program_id: i64, number: i64) -> i64 {
    curriculum::create_chapter(
        db,
        program_id,
        NewChapter {
            chapter_number: number,
            title: format!("Chapter {number}"),
            ebook_url: format!("https://cdn.example.com/ebooks/{number}.pdf"),
            video_url: format!("https://cdn.example.com/videos/{number}.mp4"),
            duration_minutes: 45,
        },
    )
    .await
    .unwrap()
}

pub async fn seed_quiz(db: &SqlitePool, chapter_id: i64, passing_score: i64) -> i64 {
    curriculum::upsert_quiz(
        db,
        chapter_id,
        "Checkpoint".into(),
        vec![
            question("What does a red octagon mean?", "Stop"),
            question("What does a yellow triangle mean?", "Yield"),
        ],
        passing_score,
    )
    .await
    .unwrap()
}

pub fn question(text: &str, correct: &str) -> QuizQuestion {
    QuizQuestion {
        question: text.to_string(),
        options: vec![
            correct.to_string(),
            "Yield".to_string(),
            "No entry".to_string(),
            "Speed limit".to_string(),
        ],
        correct_answer: correct.to_string(),
    }
}
