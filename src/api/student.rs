use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::assistant::tutor_instruction;
use crate::auth::{self, Principal};
use crate::curriculum::{self, Chapter};
use crate::enrollment;
use crate::error::{Error, Result};
use crate::policy::{self, Op};
use crate::progress::{self, TranscriptEntry};
use crate::quiz::{self, Answers, QuizForStudent, ScoreOutcome};
use crate::server::AppState;

/// The student's active program, or `Forbidden` when none is active.
async fn active_program(state: &AppState, principal: &Principal) -> Result<i64> {
    Ok(enrollment::active_enrollment(&state.db, principal.id)
        .await?
        .ok_or(Error::Forbidden)?
        .program_id)
}

/// Chapter lookup scoped to the student's active program. Does not consult
/// the unlock policy; callers that expose content must gate separately.
async fn enrolled_chapter(
    state: &AppState,
    principal: &Principal,
    chapter_id: i64,
) -> Result<Chapter> {
    let chapter = curriculum::get_chapter(&state.db, chapter_id).await?;
    if chapter.program_id != active_program(state, principal).await? {
        return Err(Error::Forbidden);
    }
    Ok(chapter)
}

/// Chapter lookup that also enforces the unlock policy, evaluated fresh
/// against the ledger on every call.
async fn unlocked_chapter(
    state: &AppState,
    principal: &Principal,
    chapter_id: i64,
) -> Result<Chapter> {
    let chapter = enrolled_chapter(state, principal, chapter_id).await?;
    let file = progress::get_file(
        &state.db,
        state.unlock_rule,
        principal.id,
        chapter.program_id,
    )
    .await?;
    let entry = file
        .iter()
        .find(|e| e.chapter_id == chapter_id)
        .ok_or(Error::NotFound("chapter"))?;
    if !entry.unlocked {
        return Err(Error::Forbidden);
    }
    Ok(chapter)
}

#[derive(Serialize, ToSchema)]
pub struct ChapterListEntry {
    pub chapter_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub duration_minutes: i64,
    pub unlocked: bool,
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chapters",
    method(get),
    responses((status = 200, body = Vec<ChapterListEntry>), (status = 403))
)]
pub async fn list_chapters(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<ChapterListEntry>>> {
    policy::authorize(&principal, Op::ViewChapters)?;
    let program_id = active_program(&state, &principal).await?;
    let chapters = curriculum::list_chapters(&state.db, program_id).await?;
    let file = progress::get_file(&state.db, state.unlock_rule, principal.id, program_id).await?;
    // both are ordered by chapter_number, so they line up
    let entries = chapters
        .into_iter()
        .zip(file)
        .map(|(chapter, entry)| ChapterListEntry {
            chapter_id: chapter.id,
            chapter_number: chapter.chapter_number,
            title: chapter.title,
            duration_minutes: chapter.duration_minutes,
            unlocked: entry.unlocked,
        })
        .collect();
    Ok(Json(entries))
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chapters/{id}",
    method(get),
    responses((status = 200, body = Chapter), (status = 403, description = "Chapter locked"))
)]
pub async fn get_chapter(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Chapter>> {
    policy::authorize(&principal, Op::ViewChapters)?;
    let chapter = unlocked_chapter(&state, &principal, id).await?;
    Ok(Json(chapter))
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chapters/{id}/quiz",
    method(get),
    responses((status = 200, body = QuizForStudent), (status = 404))
)]
pub async fn get_quiz(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<QuizForStudent>> {
    policy::authorize(&principal, Op::ViewChapters)?;
    unlocked_chapter(&state, &principal, id).await?;
    let quiz = curriculum::get_quiz(&state.db, id)
        .await?
        .ok_or(Error::NotFound("quiz"))?;
    Ok(Json(quiz.into()))
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitQuizRequest {
    /// Chosen option per question index; missing indices count as incorrect.
    pub answers: Answers,
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chapters/{id}/quiz",
    method(post),
    request_body = SubmitQuizRequest,
    responses((status = 200, body = ScoreOutcome), (status = 403))
)]
pub async fn submit_quiz(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<Json<ScoreOutcome>> {
    policy::authorize(&principal, Op::SubmitQuiz)?;
    unlocked_chapter(&state, &principal, id).await?;
    let outcome = quiz::submit(&state.db, principal.id, id, &req.answers).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize, ToSchema)]
pub struct CompletionRequest {
    pub completed: bool,
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chapters/{id}/ebook",
    method(post),
    request_body = CompletionRequest,
    responses((status = 200))
)]
pub async fn record_ebook(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<CompletionRequest>,
) -> Result<()> {
    policy::authorize(&principal, Op::RecordSelfProgress)?;
    enrolled_chapter(&state, &principal, id).await?;
    progress::record_ebook_progress(&state.db, principal.id, id, req.completed).await
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chapters/{id}/video",
    method(post),
    request_body = CompletionRequest,
    responses((status = 200))
)]
pub async fn record_video(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<CompletionRequest>,
) -> Result<()> {
    policy::authorize(&principal, Op::RecordSelfProgress)?;
    enrolled_chapter(&state, &principal, id).await?;
    progress::record_video_progress(&state.db, principal.id, id, req.completed).await
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/transcript",
    method(get),
    responses((status = 200, body = Vec<TranscriptEntry>))
)]
pub async fn transcript(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<TranscriptEntry>>> {
    policy::authorize(&principal, Op::ViewOwnTranscript)?;
    let program_id = active_program(&state, &principal).await?;
    let file = progress::get_file(&state.db, state.unlock_rule, principal.id, program_id).await?;
    Ok(Json(file))
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
}

#[utoipa::path(
    context_path = "/api/student",
    path = "/chat",
    method(post),
    request_body = ChatRequest,
    responses((status = 200, body = ChatResponse), (status = 503, description = "Assistant unavailable"))
)]
pub async fn chat(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    policy::authorize(&principal, Op::AskAssistant)?;
    let assistant = state.assistant.clone().ok_or(Error::UpstreamUnavailable)?;
    let user = auth::get_user(&state.db, principal.id).await?;

    let history = state
        .chats
        .get_with(principal.id, async { Arc::new(Mutex::new(Vec::new())) })
        .await;
    let mut history = history.lock().await;

    let mut messages = vec![ChatCompletionRequestMessage::System(
        tutor_instruction(&user.name).into(),
    )];
    messages.extend(history.iter().cloned());
    let user_message = ChatCompletionRequestMessage::User(req.message.into());
    messages.push(user_message.clone());

    let reply = assistant.chat(messages).await?;
    history.push(user_message);
    history.push(
        ChatCompletionRequestAssistantMessageArgs::default()
            .content(reply.clone())
            .build()
            .map_err(anyhow::Error::from)?
            .into(),
    );
    Ok(Json(ChatResponse { reply }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chapters", get(list_chapters))
        .route("/chapters/{id}", get(get_chapter))
        .route("/chapters/{id}/quiz", get(get_quiz).post(submit_quiz))
        .route("/chapters/{id}/ebook", post(record_ebook))
        .route("/chapters/{id}/video", post(record_video))
        .route("/transcript", get(transcript))
        .route("/chat", post(chat))
}
