use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

/// Authenticated caller, resolved from a bearer token plus a profile lookup.
/// Treated as trusted input by every domain operation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Principal {
    pub id: i64,
    pub school_id: i64,
    pub role: Role,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub school_id: i64,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub instructor_id: Option<i64>,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Unexpected(anyhow::anyhow!("failed to hash password: {e}")))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> Result<()> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| Error::Unexpected(anyhow::anyhow!("failed to parse password hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| Error::Unauthenticated)
}

pub async fn create_user(
    database: &SqlitePool,
    school_id: i64,
    role: Role,
    name: String,
    email: String,
    password: String,
    instructor_id: Option<i64>,
) -> Result<i64> {
    if name.trim().is_empty() || email.trim().is_empty() {
        return Err(Error::validation("name and email are required"));
    }
    if password.len() < 6 {
        return Err(Error::validation("password must be at least 6 characters"));
    }
    if instructor_id.is_some() && role != Role::Student {
        return Err(Error::validation("only students can have an assigned instructor"));
    }
    let password_hash = hash_password(&password)?;
    let user = sqlx::query(
        "INSERT INTO users (school_id, role, name, email, password, instructor_id) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(school_id)
    .bind(role)
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .bind(instructor_id)
    .execute(database)
    .await
    .map_err(|e| match Error::from(e) {
        Error::Conflict(_) => Error::conflict(format!("email {email} is already registered")),
        other => other,
    })?;
    Ok(user.last_insert_rowid())
}

pub async fn get_user(database: &SqlitePool, id: i64) -> Result<UserInfo> {
    sqlx::query_as::<_, UserInfo>(
        "SELECT id, school_id, role, name, email, instructor_id FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("user"))
}

pub async fn list_users(
    database: &SqlitePool,
    school_id: i64,
    role: Option<Role>,
) -> Result<Vec<UserInfo>> {
    let users = match role {
        Some(role) => {
            sqlx::query_as::<_, UserInfo>(
                "SELECT id, school_id, role, name, email, instructor_id FROM users \
                 WHERE school_id = ? AND role = ? ORDER BY name ASC",
            )
            .bind(school_id)
            .bind(role)
            .fetch_all(database)
            .await?
        }
        None => {
            sqlx::query_as::<_, UserInfo>(
                "SELECT id, school_id, role, name, email, instructor_id FROM users \
                 WHERE school_id = ? ORDER BY name ASC",
            )
            .bind(school_id)
            .fetch_all(database)
            .await?
        }
    };
    Ok(users)
}

/// Assign an instructor to a student. Both must belong to the given school
/// and carry the expected roles.
pub async fn assign_instructor(
    database: &SqlitePool,
    school_id: i64,
    student_id: i64,
    instructor_id: i64,
) -> Result<()> {
    let student = get_user(database, student_id).await?;
    if student.school_id != school_id || student.role != Role::Student {
        return Err(Error::NotFound("student"));
    }
    let instructor = get_user(database, instructor_id).await?;
    if instructor.school_id != school_id || instructor.role != Role::Instructor {
        return Err(Error::NotFound("instructor"));
    }
    sqlx::query("UPDATE users SET instructor_id = ? WHERE id = ?")
        .bind(instructor_id)
        .bind(student_id)
        .execute(database)
        .await?;
    Ok(())
}

static JWT_SECRET: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let _ = dotenvy::dotenv();
    dotenvy::var("JWT_SECRET")
        .expect("JWT_SECRET must be set")
        .as_bytes()
        .to_vec()
});

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    exp: i64,
}

pub async fn login(
    database: &SqlitePool,
    email: String,
    password: String,
    expired_time: time::Duration,
) -> Result<String> {
    let user = sqlx::query_as::<_, (i64, String)>("SELECT id, password FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(database)
        .await?
        .ok_or(Error::Unauthenticated)?;
    verify_password(&password, &user.1)?;
    let exp = (time::OffsetDateTime::now_utc() + expired_time).unix_timestamp();
    let claims = Claims { sub: user.0, exp };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&JWT_SECRET),
    )
    .map_err(|e| Error::Unexpected(e.into()))?;
    Ok(token)
}

pub fn verify_token(token: &str) -> Result<i64> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(&JWT_SECRET),
        &Validation::default(),
    )
    .map_err(|_| Error::Unauthenticated)?
    .claims;
    Ok(claims.sub)
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::Unauthenticated)?;
        let user_id = verify_token(bearer.token())?;
        sqlx::query_as::<_, Principal>("SELECT id, school_id, role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(Error::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[tokio::test]
    async fn test_login_roundtrip() {
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
        let db = test_util::memory_pool().await;
        let school_id = test_util::seed_school(&db).await;
        let id = create_user(
            &db,
            school_id,
            Role::Student,
            "Ada".into(),
            "ada@example.com".into(),
            "secret1".into(),
            None,
        )
        .await
        .unwrap();
        let token = login(
            &db,
            "ada@example.com".into(),
            "secret1".into(),
            time::Duration::hours(1),
        )
        .await
        .unwrap();
        assert_eq!(verify_token(&token).unwrap(), id);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
        let db = test_util::memory_pool().await;
        let school_id = test_util::seed_school(&db).await;
        create_user(
            &db,
            school_id,
            Role::Student,
            "Ada".into(),
            "ada@example.com".into(),
            "secret1".into(),
            None,
        )
        .await
        .unwrap();
        let err = login(
            &db,
            "ada@example.com".into(),
            "wrong".into(),
            time::Duration::hours(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let db = test_util::memory_pool().await;
        let school_id = test_util::seed_school(&db).await;
        create_user(
            &db,
            school_id,
            Role::Student,
            "Ada".into(),
            "ada@example.com".into(),
            "secret1".into(),
            None,
        )
        .await
        .unwrap();
        let err = create_user(
            &db,
            school_id,
            Role::Instructor,
            "Bob".into(),
            "ada@example.com".into(),
            "secret2".into(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
