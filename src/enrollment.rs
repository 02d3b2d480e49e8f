use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Withdrawn,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub program_id: i64,
    pub status: EnrollmentStatus,
}

/// Enroll a student. At most one active enrollment per student: activating
/// while another is active is rejected with `Conflict` (backed by a partial
/// unique index, so a concurrent second activation loses the race too).
pub async fn enroll(database: &SqlitePool, student_id: i64, program_id: i64) -> Result<i64> {
    let existing = active_enrollment(database, student_id).await?;
    if existing.is_some() {
        return Err(Error::conflict("student already has an active enrollment"));
    }
    let result = sqlx::query(
        "INSERT INTO enrollments (student_id, program_id, status) VALUES (?, ?, 'active')",
    )
    .bind(student_id)
    .bind(program_id)
    .execute(database)
    .await
    .map_err(|e| match Error::from(e) {
        Error::Conflict(_) => Error::conflict("student already has an active enrollment"),
        other => other,
    })?;
    Ok(result.last_insert_rowid())
}

pub async fn active_enrollment(
    database: &SqlitePool,
    student_id: i64,
) -> Result<Option<Enrollment>> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT id, student_id, program_id, status FROM enrollments \
         WHERE student_id = ? AND status = 'active'",
    )
    .bind(student_id)
    .fetch_optional(database)
    .await?;
    Ok(enrollment)
}

pub async fn get_enrollment(database: &SqlitePool, id: i64) -> Result<Enrollment> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT id, student_id, program_id, status FROM enrollments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("enrollment"))
}

pub async fn complete(database: &SqlitePool, enrollment_id: i64) -> Result<()> {
    transition(database, enrollment_id, EnrollmentStatus::Completed).await
}

pub async fn withdraw(database: &SqlitePool, enrollment_id: i64) -> Result<()> {
    transition(database, enrollment_id, EnrollmentStatus::Withdrawn).await
}

async fn transition(
    database: &SqlitePool,
    enrollment_id: i64,
    to: EnrollmentStatus,
) -> Result<()> {
    let result = sqlx::query("UPDATE enrollments SET status = ? WHERE id = ? AND status = 'active'")
        .bind(to)
        .bind(enrollment_id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM enrollments WHERE id = ?")
            .bind(enrollment_id)
            .fetch_optional(database)
            .await?;
        return match exists {
            Some(_) => Err(Error::conflict("enrollment is not active")),
            None => Err(Error::NotFound("enrollment")),
        };
    }
    Ok(())
}
