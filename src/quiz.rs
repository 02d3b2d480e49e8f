use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::curriculum::{self, Quiz, QuizQuestion};
use crate::error::{Error, Result};
use crate::progress;

/// Quiz shape handed to students: no `correct_answer` field exists on this
/// type, so answers cannot leak through serialization.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizForStudent {
    pub id: i64,
    pub chapter_id: i64,
    pub title: String,
    pub questions: Vec<StudentQuestion>,
    pub passing_score: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentQuestion {
    pub question: String,
    pub options: Vec<String>,
}

impl From<Quiz> for QuizForStudent {
    fn from(quiz: Quiz) -> Self {
        QuizForStudent {
            id: quiz.id,
            chapter_id: quiz.chapter_id,
            title: quiz.title,
            questions: quiz
                .questions
                .into_iter()
                .map(|q| StudentQuestion {
                    question: q.question,
                    options: q.options,
                })
                .collect(),
            passing_score: quiz.passing_score,
        }
    }
}

/// Answers keyed by question index; a missing index counts as incorrect.
pub type Answers = BTreeMap<usize, String>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoreOutcome {
    pub score: i64,
    pub passed: bool,
}

/// Pure scoring function. Exact case-sensitive string comparison against the
/// stored answer, score rounded half-up to an integer percentage.
pub fn score(
    questions: &[QuizQuestion],
    answers: &Answers,
    passing_score: i64,
) -> Result<ScoreOutcome> {
    if questions.is_empty() {
        return Err(Error::validation("quiz has no questions"));
    }
    let correct = questions
        .iter()
        .enumerate()
        .filter(|(i, q)| answers.get(i).is_some_and(|a| *a == q.correct_answer))
        .count();
    let score = ((correct * 100) as f64 / questions.len() as f64).round() as i64;
    Ok(ScoreOutcome {
        score,
        passed: score >= passing_score,
    })
}

/// Score a submission and write the result through the ledger. Resubmission
/// is unlimited and last-score-wins; concurrent submissions race and the
/// store's upsert decides which lands last.
pub async fn submit(
    database: &SqlitePool,
    student_id: i64,
    chapter_id: i64,
    answers: &Answers,
) -> Result<ScoreOutcome> {
    let quiz = curriculum::get_quiz(database, chapter_id)
        .await?
        .ok_or(Error::NotFound("quiz"))?;
    let outcome = score(&quiz.questions, answers, quiz.passing_score)?;
    progress::record_quiz_score(database, student_id, chapter_id, outcome.score).await?;
    Ok(outcome)
}
