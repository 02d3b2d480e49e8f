//! Role gate. Every operation's allowed roles live in one table instead of
//! per-handler string comparisons; scope checks are explicit joins against the
//! store. Evaluation order is always: authentication (the `Principal`
//! extractor), then role, then scope.

use sqlx::SqlitePool;

use crate::auth::{Principal, Role};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ManagePrograms,
    ManageChapters,
    ManageQuizzes,
    ManageUsers,
    ManageEnrollments,
    ViewChapters,
    SubmitQuiz,
    RecordSelfProgress,
    RecordPractical,
    Annotate,
    ViewOwnTranscript,
    ViewStudentTranscript,
    AskAssistant,
}

const POLICY: &[(Op, &[Role])] = &[
    (Op::ManagePrograms, &[Role::Admin]),
    (Op::ManageChapters, &[Role::Admin]),
    (Op::ManageQuizzes, &[Role::Admin]),
    (Op::ManageUsers, &[Role::Admin]),
    (Op::ManageEnrollments, &[Role::Admin]),
    (Op::ViewChapters, &[Role::Student]),
    (Op::SubmitQuiz, &[Role::Student]),
    (Op::RecordSelfProgress, &[Role::Student]),
    (Op::RecordPractical, &[Role::Instructor]),
    (Op::Annotate, &[Role::Instructor]),
    (Op::ViewOwnTranscript, &[Role::Student]),
    (Op::ViewStudentTranscript, &[Role::Admin, Role::Instructor]),
    (Op::AskAssistant, &[Role::Student]),
];

pub fn allowed_roles(op: Op) -> &'static [Role] {
    POLICY
        .iter()
        .find(|(o, _)| *o == op)
        .map(|(_, roles)| *roles)
        .unwrap_or(&[])
}

pub fn authorize(principal: &Principal, op: Op) -> Result<()> {
    if allowed_roles(op).contains(&principal.role) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

/// Tenant scope: the program must belong to the caller's school.
pub async fn ensure_program_in_school(
    database: &SqlitePool,
    principal: &Principal,
    program_id: i64,
) -> Result<()> {
    let school_id =
        sqlx::query_scalar::<_, i64>("SELECT school_id FROM programs WHERE id = ?")
            .bind(program_id)
            .fetch_optional(database)
            .await?
            .ok_or(Error::NotFound("program"))?;
    if school_id != principal.school_id {
        return Err(Error::Forbidden);
    }
    Ok(())
}

/// Tenant scope via the chapter's owning program.
pub async fn ensure_chapter_in_school(
    database: &SqlitePool,
    principal: &Principal,
    chapter_id: i64,
) -> Result<()> {
    let school_id = sqlx::query_scalar::<_, i64>(
        "SELECT p.school_id FROM chapters c JOIN programs p ON p.id = c.program_id \
         WHERE c.id = ?",
    )
    .bind(chapter_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("chapter"))?;
    if school_id != principal.school_id {
        return Err(Error::Forbidden);
    }
    Ok(())
}

/// Tenant scope: the target student must belong to the caller's school.
pub async fn ensure_student_in_school(
    database: &SqlitePool,
    principal: &Principal,
    student_id: i64,
) -> Result<()> {
    let school_id = sqlx::query_scalar::<_, i64>(
        "SELECT school_id FROM users WHERE id = ? AND role = 'student'",
    )
    .bind(student_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("student"))?;
    if school_id != principal.school_id {
        return Err(Error::Forbidden);
    }
    Ok(())
}

/// The instructor-only writes (practical sign-off, notes) require the caller
/// to be the student's assigned instructor, checked against the store rather
/// than trusted from the request.
pub async fn ensure_assigned_instructor(
    database: &SqlitePool,
    actor: &Principal,
    student_id: i64,
) -> Result<()> {
    let instructor_id = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT instructor_id FROM users WHERE id = ? AND role = 'student'",
    )
    .bind(student_id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("student"))?;
    if instructor_id != Some(actor.id) {
        return Err(Error::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: 1,
            school_id: 1,
            role,
        }
    }

    #[test]
    fn test_policy_table() {
        assert!(authorize(&principal(Role::Admin), Op::ManagePrograms).is_ok());
        assert!(authorize(&principal(Role::Student), Op::ManagePrograms).is_err());
        assert!(authorize(&principal(Role::Instructor), Op::RecordPractical).is_ok());
        assert!(authorize(&principal(Role::Student), Op::RecordPractical).is_err());
        assert!(authorize(&principal(Role::Admin), Op::ViewStudentTranscript).is_ok());
        assert!(authorize(&principal(Role::Instructor), Op::ViewStudentTranscript).is_ok());
        assert!(authorize(&principal(Role::Student), Op::ViewStudentTranscript).is_err());
    }

    #[tokio::test]
    async fn test_cross_school_program_is_forbidden() {
        let db = crate::test_util::memory_pool().await;
        let school_a = crate::test_util::seed_school(&db).await;
        let school_b = crate::test_util::seed_school(&db).await;
        let program_b = crate::test_util::seed_program(&db, school_b).await;
        let admin_a = Principal {
            id: 1,
            school_id: school_a,
            role: Role::Admin,
        };
        let err = ensure_program_in_school(&db, &admin_a, program_b)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }
}
