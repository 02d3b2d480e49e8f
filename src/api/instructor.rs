use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{self, Principal, UserInfo};
use crate::enrollment;
use crate::error::{Error, Result};
use crate::policy::{self, Op};
use crate::progress::{self, TranscriptEntry};
use crate::server::AppState;

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/students",
    method(get),
    responses((status = 200, body = Vec<UserInfo>), (status = 403))
)]
pub async fn list_students(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<UserInfo>>> {
    policy::authorize(&principal, Op::ViewStudentTranscript)?;
    let students = sqlx::query_as::<_, UserInfo>(
        "SELECT id, school_id, role, name, email, instructor_id FROM users \
         WHERE instructor_id = ? ORDER BY name ASC",
    )
    .bind(principal.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(students))
}

#[derive(Deserialize)]
pub struct TranscriptQuery {
    pub program_id: Option<i64>,
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/students/{id}/transcript",
    method(get),
    responses((status = 200, body = Vec<TranscriptEntry>), (status = 403))
)]
pub async fn student_transcript(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Json<Vec<TranscriptEntry>>> {
    policy::authorize(&principal, Op::ViewStudentTranscript)?;
    policy::ensure_assigned_instructor(&state.db, &principal, id).await?;
    let program_id = match query.program_id {
        Some(program_id) => {
            policy::ensure_program_in_school(&state.db, &principal, program_id).await?;
            program_id
        }
        None => enrollment::active_enrollment(&state.db, id)
            .await?
            .ok_or(Error::NotFound("enrollment"))?
            .program_id,
    };
    let file = progress::get_file(&state.db, state.unlock_rule, id, program_id).await?;
    Ok(Json(file))
}

#[derive(Deserialize, ToSchema)]
pub struct PracticalRequest {
    pub completed: bool,
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/students/{student_id}/chapters/{chapter_id}/practical",
    method(post),
    request_body = PracticalRequest,
    responses((status = 200), (status = 403, description = "Not the assigned instructor"))
)]
pub async fn record_practical(
    State(state): State<AppState>,
    principal: Principal,
    Path((student_id, chapter_id)): Path<(i64, i64)>,
    Json(req): Json<PracticalRequest>,
) -> Result<()> {
    policy::authorize(&principal, Op::RecordPractical)?;
    policy::ensure_chapter_in_school(&state.db, &principal, chapter_id).await?;
    progress::record_practical(&state.db, student_id, chapter_id, req.completed, &principal).await
}

#[derive(Deserialize, ToSchema)]
pub struct AnnotateRequest {
    pub notes: String,
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/students/{student_id}/chapters/{chapter_id}/notes",
    method(post),
    request_body = AnnotateRequest,
    responses((status = 200), (status = 403, description = "Not the assigned instructor"))
)]
pub async fn annotate(
    State(state): State<AppState>,
    principal: Principal,
    Path((student_id, chapter_id)): Path<(i64, i64)>,
    Json(req): Json<AnnotateRequest>,
) -> Result<()> {
    policy::authorize(&principal, Op::Annotate)?;
    policy::ensure_chapter_in_school(&state.db, &principal, chapter_id).await?;
    progress::annotate(&state.db, student_id, chapter_id, req.notes, &principal).await
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/students/{id}",
    method(get),
    responses((status = 200, body = UserInfo), (status = 403))
)]
pub async fn student_info(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<UserInfo>> {
    policy::authorize(&principal, Op::ViewStudentTranscript)?;
    policy::ensure_assigned_instructor(&state.db, &principal, id).await?;
    let user = auth::get_user(&state.db, id).await?;
    Ok(Json(user))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students))
        .route("/students/{id}", get(student_info))
        .route("/students/{id}/transcript", get(student_transcript))
        .route(
            "/students/{student_id}/chapters/{chapter_id}/practical",
            post(record_practical),
        )
        .route(
            "/students/{student_id}/chapters/{chapter_id}/notes",
            post(annotate),
        )
}
