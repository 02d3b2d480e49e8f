use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Result;
use crate::school;
use crate::server::AppState;
use crate::{auth, auth::Principal};

#[derive(Deserialize, ToSchema)]
pub struct RegisterSchoolRequest {
    pub school_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterSchoolResponse {
    pub school_id: i64,
    pub admin_id: i64,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/register_school",
    method(post),
    request_body = RegisterSchoolRequest,
    responses(
        (status = 201, description = "School and admin created", body = RegisterSchoolResponse),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register_school(
    State(state): State<AppState>,
    Json(req): Json<RegisterSchoolRequest>,
) -> Result<(StatusCode, Json<RegisterSchoolResponse>)> {
    let (school_id, admin_id) = school::register_school(
        &state.db,
        req.school_name,
        req.email,
        req.phone,
        req.admin_name,
        req.admin_email,
        req.admin_password,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterSchoolResponse {
            school_id,
            admin_id,
        }),
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let token = auth::login(&state.db, req.email, req.password, time::Duration::days(7)).await?;
    Ok(Json(LoginResponse { token }))
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/me",
    method(get),
    responses((status = 200, body = Principal), (status = 401))
)]
pub async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register_school", post(register_school))
        .route("/login", post(login))
        .route("/me", axum::routing::get(me))
}
