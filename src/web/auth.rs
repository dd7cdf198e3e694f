use crate::db::{self, NewUser, PublicUser};
use crate::domain::models::UserRole;
use crate::error::{AppError, AppResult};
use crate::middleware::{client_ip, RateLimiter};
use crate::state::SharedState;
use crate::web::session::{self, TokenKind, TokenPair};
use crate::web::validation::min_chars;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use once_cell::sync::Lazy;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// 5 login attempts per 60 seconds per client IP.
pub static LOGIN_RATE_LIMITER: Lazy<RateLimiter> = Lazy::new(|| RateLimiter::new(5, 60));

const MIN_PASSWORD_CHARS: usize = 6;
const MIN_NAME_CHARS: usize = 2;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub career: Option<String>,
    pub course: Option<String>,
    pub parallel: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .with_state(state)
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn issue(state: &SharedState, user: db::DbUser) -> AppResult<AuthResponse> {
    let tokens = session::issue_pair(state, user.id, user.role)
        .map_err(|e| anyhow::anyhow!("Failed to sign tokens: {}", e))?;
    Ok(AuthResponse {
        user: PublicUser::from(user),
        tokens,
    })
}

async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    if !state.config.email_allowed(&email) {
        return Err(AppError::Validation(format!(
            "Email must belong to the @{} domain",
            state.config.allowed_email_domain
        )));
    }
    if payload.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters long"
        )));
    }
    let first_name = min_chars("first_name", &payload.first_name, MIN_NAME_CHARS)?;
    let last_name = min_chars("last_name", &payload.last_name, MIN_NAME_CHARS)?;

    let hash = hash_password(&payload.password)?;
    let user = db::insert_user(
        &state.pool,
        &NewUser {
            email: &email,
            hash: &hash,
            first_name,
            last_name,
            role: UserRole::Student,
            career: payload.career.as_deref(),
            course: payload.course.as_deref(),
            parallel: payload.parallel.as_deref(),
        },
    )
    .await?
    .ok_or_else(|| AppError::Conflict("Email is already registered".to_string()))?;

    tracing::info!("Registered user {}", user.id);
    Ok(Json(issue(&state, user)?))
}

async fn login(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let ip = client_ip(&headers, peer, state.config.trust_proxy);
    if !LOGIN_RATE_LIMITER.check(&ip).await {
        tracing::warn!("Login rate limit exceeded for IP: {}", ip);
        return Err(AppError::TooManyRequests);
    }

    let user = db::find_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.hash).map_err(|_| AppError::Unauthorized)?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized)?;

    if !user.is_active {
        tracing::warn!("Inactive user {} attempted to log in", user.id);
        return Err(AppError::Unauthorized);
    }

    Ok(Json(issue(&state, user)?))
}

async fn refresh(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let claims =
        session::verify_kind(&payload.refresh_token, &state.session_key, TokenKind::Refresh)
            .map_err(|e| {
                tracing::warn!("Refresh token rejected: {}", e);
                AppError::Unauthorized
            })?;

    let user = db::find_user_by_id(&state.pool, claims.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(issue(&state, user)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("password123").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default().verify_password(b"password123", &parsed).is_ok());
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }
}
