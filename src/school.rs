use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::{self, Role};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct School {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Create a school together with its first admin user.
///
/// The two inserts are independent round-trips with no cross-call atomicity,
/// so this is a manual saga: if the admin insert fails the school row is
/// deleted again (best effort, logged) and the original error is returned.
pub async fn register_school(
    database: &SqlitePool,
    name: String,
    email: String,
    phone: String,
    admin_name: String,
    admin_email: String,
    admin_password: String,
) -> Result<(i64, i64)> {
    if name.trim().is_empty() {
        return Err(Error::validation("school name is required"));
    }
    let school = sqlx::query("INSERT INTO schools (name, email, phone) VALUES (?, ?, ?)")
        .bind(name)
        .bind(&email)
        .bind(phone)
        .execute(database)
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::conflict(format!("school {email} is already registered")),
            other => other,
        })?;
    let school_id = school.last_insert_rowid();

    match auth::create_user(
        database,
        school_id,
        Role::Admin,
        admin_name,
        admin_email,
        admin_password,
        None,
    )
    .await
    {
        Ok(admin_id) => Ok((school_id, admin_id)),
        Err(e) => {
            // compensation: roll the school insert back by hand
            if let Err(cleanup) = sqlx::query("DELETE FROM schools WHERE id = ?")
                .bind(school_id)
                .execute(database)
                .await
            {
                warn!("failed to delete school {school_id} after admin creation failed: {cleanup}");
            }
            Err(e)
        }
    }
}

pub async fn get_school(database: &SqlitePool, id: i64) -> Result<School> {
    sqlx::query_as::<_, School>("SELECT id, name, email, phone FROM schools WHERE id = ?")
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("school"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[tokio::test]
    async fn test_register_school_and_admin() {
        let db = test_util::memory_pool().await;
        let (school_id, admin_id) = register_school(
            &db,
            "City Driving".into(),
            "office@city-driving.example".into(),
            "555-0100".into(),
            "Dana".into(),
            "dana@city-driving.example".into(),
            "secret1".into(),
        )
        .await
        .unwrap();
        let school = get_school(&db, school_id).await.unwrap();
        assert_eq!(school.name, "City Driving");
        let admin = auth::get_user(&db, admin_id).await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.school_id, school_id);
    }

    #[tokio::test]
    async fn test_failed_admin_insert_deletes_school() {
        let db = test_util::memory_pool().await;
        register_school(
            &db,
            "City Driving".into(),
            "office@city-driving.example".into(),
            "555-0100".into(),
            "Dana".into(),
            "dana@city-driving.example".into(),
            "secret1".into(),
        )
        .await
        .unwrap();

        // second registration reuses the admin email, so the user insert fails
        // after the school insert succeeded
        let err = register_school(
            &db,
            "Other School".into(),
            "office@other.example".into(),
            "555-0200".into(),
            "Eve".into(),
            "dana@city-driving.example".into(),
            "secret2".into(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // the compensation removed the half-created school
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM schools")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
