use std::sync::Arc;
use std::time::Duration;

use async_openai::types::ChatCompletionRequestMessage;
use axum::Router;
use moka::future::Cache;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::assistant::Assistant;
use crate::progress::UnlockRule;

pub type ChatHistory = Arc<Mutex<Vec<ChatCompletionRequestMessage>>>;

/// Shared handles, built once at startup and cloned per request. The pool and
/// assistant client are stateless handles; no teardown required.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub unlock_rule: UnlockRule,
    pub assistant: Option<Arc<Assistant>>,
    pub chats: Cache<i64, ChatHistory>,
}

impl AppState {
    pub fn new(db: SqlitePool, unlock_rule: UnlockRule, assistant: Option<Arc<Assistant>>) -> Self {
        Self {
            db,
            unlock_rule,
            assistant,
            chats: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(Duration::from_secs(30 * 60))
                .build(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/public", api::public::routes())
        .nest("/api/admin", api::admin::routes())
        .nest("/api/instructor", api::instructor::routes())
        .nest("/api/student", api::student::routes())
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{self, Role};
    use crate::test_util;

    async fn serve(state: AppState, request: Request<Body>) -> StatusCode {
        router(state).oneshot(request).await.unwrap().status()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn login_token(db: &SqlitePool, email: &str) -> String {
        auth::login(
            db,
            email.to_string(),
            "secret1".to_string(),
            time::Duration::hours(1),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_or_invalid_token_is_unauthorized() {
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
        let db = test_util::memory_pool().await;
        let state = AppState::new(db, UnlockRule::default(), None);

        let status = serve(state.clone(), get("/api/student/transcript", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let status = serve(state, get("/api/student/transcript", Some("not-a-token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden_not_unauthorized() {
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
        let db = test_util::memory_pool().await;
        let school_id = test_util::seed_school(&db).await;
        auth::create_user(
            &db,
            school_id,
            Role::Student,
            "Ada".into(),
            "ada@router-test.example".into(),
            "secret1".into(),
            None,
        )
        .await
        .unwrap();
        let token = login_token(&db, "ada@router-test.example").await;
        let state = AppState::new(db, UnlockRule::default(), None);

        // valid identity, admin-only route: 403, so the client knows not to re-auth
        let status = serve(state, get("/api/admin/programs", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_instructor_transcript_scoped_to_own_school() {
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
        let db = test_util::memory_pool().await;
        let school_a = test_util::seed_school(&db).await;
        let school_b = test_util::seed_school(&db).await;
        let instructor_id = auth::create_user(
            &db,
            school_a,
            Role::Instructor,
            "Ira".into(),
            "ira@router-test.example".into(),
            "secret1".into(),
            None,
        )
        .await
        .unwrap();
        let student_id =
            test_util::seed_user(&db, school_a, Role::Student, Some(instructor_id)).await;
        let program_a = test_util::seed_program(&db, school_a).await;
        let program_b = test_util::seed_program(&db, school_b).await;
        test_util::seed_chapter(&db, program_a, 1).await;
        test_util::seed_chapter(&db, program_b, 1).await;
        let token = login_token(&db, "ira@router-test.example").await;
        let state = AppState::new(db, UnlockRule::default(), None);

        // assigned instructor, but the requested program belongs to another school
        let status = serve(
            state.clone(),
            get(
                &format!("/api/instructor/students/{student_id}/transcript?program_id={program_b}"),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let status = serve(
            state,
            get(
                &format!("/api/instructor/students/{student_id}/transcript?program_id={program_a}"),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
