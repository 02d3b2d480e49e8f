use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{self, Principal, Role, UserInfo};
use crate::curriculum::{self, Chapter, NewChapter, Program, Quiz, QuizQuestion};
use crate::enrollment;
use crate::error::{Error, Result};
use crate::policy::{self, Op};
use crate::progress::{self, TranscriptEntry};
use crate::server::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ProgramRequest {
    pub name: String,
    pub license_type: String,
    #[serde(default)]
    pub total_chapters: i64,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/programs",
    method(post),
    request_body = ProgramRequest,
    responses((status = 201, body = i64), (status = 403))
)]
pub async fn create_program(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ProgramRequest>,
) -> Result<(StatusCode, Json<i64>)> {
    policy::authorize(&principal, Op::ManagePrograms)?;
    let id = curriculum::create_program(
        &state.db,
        principal.school_id,
        req.name,
        req.license_type,
        req.total_chapters,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(id)))
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/programs",
    method(get),
    responses((status = 200, body = Vec<Program>))
)]
pub async fn list_programs(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Program>>> {
    policy::authorize(&principal, Op::ManagePrograms)?;
    let programs = curriculum::list_programs(&state.db, principal.school_id).await?;
    Ok(Json(programs))
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/programs/{id}",
    method(put),
    request_body = ProgramRequest,
    responses((status = 200), (status = 404))
)]
pub async fn update_program(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<ProgramRequest>,
) -> Result<()> {
    policy::authorize(&principal, Op::ManagePrograms)?;
    policy::ensure_program_in_school(&state.db, &principal, id).await?;
    curriculum::update_program(&state.db, id, req.name, req.license_type, req.total_chapters)
        .await
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/programs/{id}/chapters",
    method(post),
    request_body = NewChapter,
    responses((status = 201, body = i64), (status = 409, description = "Duplicate chapter number"))
)]
pub async fn create_chapter(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<NewChapter>,
) -> Result<(StatusCode, Json<i64>)> {
    policy::authorize(&principal, Op::ManageChapters)?;
    policy::ensure_program_in_school(&state.db, &principal, id).await?;
    let chapter_id = curriculum::create_chapter(&state.db, id, req).await?;
    Ok((StatusCode::CREATED, Json(chapter_id)))
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/programs/{id}/chapters",
    method(get),
    responses((status = 200, body = Vec<Chapter>))
)]
pub async fn list_chapters(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Chapter>>> {
    policy::authorize(&principal, Op::ManageChapters)?;
    policy::ensure_program_in_school(&state.db, &principal, id).await?;
    let chapters = curriculum::list_chapters(&state.db, id).await?;
    Ok(Json(chapters))
}

#[derive(Deserialize, ToSchema)]
pub struct SaveQuizRequest {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub passing_score: i64,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/chapters/{id}/quiz",
    method(put),
    request_body = SaveQuizRequest,
    responses((status = 200, body = i64), (status = 400))
)]
pub async fn save_quiz(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<SaveQuizRequest>,
) -> Result<Json<i64>> {
    policy::authorize(&principal, Op::ManageQuizzes)?;
    policy::ensure_chapter_in_school(&state.db, &principal, id).await?;
    let quiz_id =
        curriculum::upsert_quiz(&state.db, id, req.title, req.questions, req.passing_score)
            .await?;
    Ok(Json(quiz_id))
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/chapters/{id}/quiz",
    method(get),
    responses((status = 200, body = Quiz), (status = 404))
)]
pub async fn get_quiz(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Quiz>> {
    policy::authorize(&principal, Op::ManageQuizzes)?;
    policy::ensure_chapter_in_school(&state.db, &principal, id).await?;
    let quiz = curriculum::get_quiz(&state.db, id)
        .await?
        .ok_or(Error::NotFound("quiz"))?;
    Ok(Json(quiz))
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateQuizRequest {
    pub question_count: usize,
}

/// Draft questions with the assistant. The draft is returned for review, not
/// saved; the admin submits it through the regular quiz upsert.
#[utoipa::path(
    context_path = "/api/admin",
    path = "/chapters/{id}/quiz/generate",
    method(post),
    request_body = GenerateQuizRequest,
    responses((status = 200, body = Vec<QuizQuestion>), (status = 503))
)]
pub async fn generate_quiz(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<GenerateQuizRequest>,
) -> Result<Json<Vec<QuizQuestion>>> {
    policy::authorize(&principal, Op::ManageQuizzes)?;
    policy::ensure_chapter_in_school(&state.db, &principal, id).await?;
    if !(1..=50).contains(&req.question_count) {
        return Err(Error::validation("question_count must be between 1 and 50"));
    }
    let assistant = state.assistant.clone().ok_or(Error::UpstreamUnavailable)?;
    let chapter = curriculum::get_chapter(&state.db, id).await?;
    let questions = assistant
        .generate_quiz(&chapter.title, req.question_count)
        .await?;
    Ok(Json(questions))
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub role: Role,
    pub name: String,
    pub email: String,
    pub password: String,
    pub instructor_id: Option<i64>,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/users",
    method(post),
    request_body = CreateUserRequest,
    responses((status = 201, body = i64), (status = 409, description = "Email already registered"))
)]
pub async fn create_user(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<i64>)> {
    policy::authorize(&principal, Op::ManageUsers)?;
    if let Some(instructor_id) = req.instructor_id {
        let instructor = auth::get_user(&state.db, instructor_id).await?;
        if instructor.school_id != principal.school_id || instructor.role != Role::Instructor {
            return Err(Error::NotFound("instructor"));
        }
    }
    let id = auth::create_user(
        &state.db,
        principal.school_id,
        req.role,
        req.name,
        req.email,
        req.password,
        req.instructor_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(id)))
}

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/users",
    method(get),
    responses((status = 200, body = Vec<UserInfo>))
)]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserInfo>>> {
    policy::authorize(&principal, Op::ManageUsers)?;
    let users = auth::list_users(&state.db, principal.school_id, query.role).await?;
    Ok(Json(users))
}

#[derive(Deserialize, ToSchema)]
pub struct AssignInstructorRequest {
    pub instructor_id: i64,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/students/{id}/instructor",
    method(post),
    request_body = AssignInstructorRequest,
    responses((status = 200), (status = 404))
)]
pub async fn assign_instructor(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<AssignInstructorRequest>,
) -> Result<()> {
    policy::authorize(&principal, Op::ManageUsers)?;
    auth::assign_instructor(&state.db, principal.school_id, id, req.instructor_id).await
}

#[derive(Deserialize, ToSchema)]
pub struct EnrollRequest {
    pub student_id: i64,
    pub program_id: i64,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/enrollments",
    method(post),
    request_body = EnrollRequest,
    responses((status = 201, body = i64), (status = 409, description = "Already actively enrolled"))
)]
pub async fn enroll(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<i64>)> {
    policy::authorize(&principal, Op::ManageEnrollments)?;
    policy::ensure_student_in_school(&state.db, &principal, req.student_id).await?;
    policy::ensure_program_in_school(&state.db, &principal, req.program_id).await?;
    let id = enrollment::enroll(&state.db, req.student_id, req.program_id).await?;
    Ok((StatusCode::CREATED, Json(id)))
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/enrollments/{id}/complete",
    method(post),
    responses((status = 200), (status = 409))
)]
pub async fn complete_enrollment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<()> {
    policy::authorize(&principal, Op::ManageEnrollments)?;
    let record = enrollment::get_enrollment(&state.db, id).await?;
    policy::ensure_student_in_school(&state.db, &principal, record.student_id).await?;
    enrollment::complete(&state.db, id).await
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/enrollments/{id}/withdraw",
    method(post),
    responses((status = 200), (status = 409))
)]
pub async fn withdraw_enrollment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<()> {
    policy::authorize(&principal, Op::ManageEnrollments)?;
    let record = enrollment::get_enrollment(&state.db, id).await?;
    policy::ensure_student_in_school(&state.db, &principal, record.student_id).await?;
    enrollment::withdraw(&state.db, id).await
}

#[derive(Deserialize)]
pub struct TranscriptQuery {
    pub program_id: Option<i64>,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/students/{id}/transcript",
    method(get),
    responses((status = 200, body = Vec<TranscriptEntry>), (status = 404))
)]
pub async fn student_transcript(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Json<Vec<TranscriptEntry>>> {
    policy::authorize(&principal, Op::ViewStudentTranscript)?;
    policy::ensure_student_in_school(&state.db, &principal, id).await?;
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

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/programs", post(create_program).get(list_programs))
        .route("/programs/{id}", put(update_program))
        .route(
            "/programs/{id}/chapters",
            post(create_chapter).get(list_chapters),
        )
        .route("/chapters/{id}/quiz", put(save_quiz).get(get_quiz))
        .route("/chapters/{id}/quiz/generate", post(generate_quiz))
        .route("/users", post(create_user).get(list_users))
        .route("/students/{id}/instructor", post(assign_instructor))
        .route("/students/{id}/transcript", get(student_transcript))
        .route("/enrollments", post(enroll))
        .route("/enrollments/{id}/complete", post(complete_enrollment))
        .route("/enrollments/{id}/withdraw", post(withdraw_enrollment))
}
