use std::sync::OnceLock;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use nexus_shared::api::{AuthResponse, LoginRequest, RegisterRequest};
use nexus_shared::{User, UserSummary};
use regex::Regex;
use serde::Deserialize;

use crate::auth::{create_token, hash_password, verify_password, AuthUser};
use crate::error::AppError;
use crate::routes::AppState;
use crate::store;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    // Validate input
    if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    if !email_regex().is_match(&req.email) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = store::users::create(&state.db, &req.username, &req.email, &password_hash).await?;

    let token = create_token(
        user.id,
        &user.username,
        &state.config.jwt_secret,
        state.config.token_expires_in,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar: user.avatar,
            token,
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let stored = store::users::find_by_username(&state.db, &req.username)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Verify password
    if !verify_password(&req.password, &stored.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = create_token(
        stored.id,
        &stored.username,
        &state.config.jwt_secret,
        state.config.token_expires_in,
    )?;

    let user = stored.into_user();

    Ok(Json(AuthResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        avatar: user.avatar,
        token,
    }))
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>, AppError> {
    let user = store::users::find_by_id(&state.db, user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /auth/search?q=
pub async fn search_users(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let users = store::users::search(&state.db, query).await?;
    Ok(Json(users))
}

/// PUT /auth/avatar
pub async fn update_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<User>, AppError> {
    let mut avatar_url: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("avatar") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;

            if !bytes.is_empty() {
                avatar_url = Some(state.uploads.save(file_name.as_deref(), &bytes).await?);
            }
        }
    }

    let avatar_url =
        avatar_url.ok_or_else(|| AppError::Validation("An image file is required".to_string()))?;

    let updated = store::users::update_avatar(&state.db, user.id, &avatar_url).await?;
    Ok(Json(updated))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {}", err))
}
