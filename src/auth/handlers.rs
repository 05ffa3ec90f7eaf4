use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            ChangeEmailRequest, ChangePasswordRequest, LoginRequest, PublicUser,
            RegisterRequest, TokenResponse,
        },
        extractors::{ApiJson, AuthUser},
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", delete(delete_me))
        .route("/user/me", get(get_me))
        .route("/user/change-password", post(change_password))
        .route("/user/change-email", post(change_email))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    payload.validate()?;
    let user = state
        .identity
        .register(
            &payload.email,
            &payload.first_name,
            &payload.last_name,
            &payload.password,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .identity
        .authenticate(payload.email.trim(), &payload.password)
        .await?;
    let token = state.keys.issue(&user.email)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.identity.profile(&email).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    payload.validate()?;
    let user = state
        .identity
        .change_password(&email, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(user.into()))
}

/// Answers with a fresh token, since the old one names the old email.
#[instrument(skip(state, payload))]
pub async fn change_email(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ApiJson(payload): ApiJson<ChangeEmailRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.validate()?;
    let user = state
        .identity
        .change_email(&email, payload.new_email.trim(), &payload.password)
        .await?;
    let token = state.keys.issue(&user.email)?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.identity.delete_by_email(&email).await?;
    Ok(Json(user.into()))
}
