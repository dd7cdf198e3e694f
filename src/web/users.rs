use crate::db::{self, PublicUser, UserChanges};
use crate::domain::models::UserRole;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use crate::web::validation::optional_min_chars;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct StudentFilter {
    pub career: Option<String>,
    pub course: Option<String>,
}

/// Admin edit. Passwords are never changed through this endpoint.
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub career: Option<String>,
    pub course: Option<String>,
    pub parallel: Option<String>,
    pub is_active: Option<bool>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/profile", get(profile))
        .route("/students", get(list_students))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .with_state(state)
}

async fn profile(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<PublicUser>> {
    let user = db::find_user_by_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user.into()))
}

async fn list_users(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<PublicUser>>> {
    user.require_admin()?;
    let users = db::get_all_users(&state.pool).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

async fn list_students(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<StudentFilter>,
) -> AppResult<Json<Vec<PublicUser>>> {
    user.require_admin()?;
    let students = db::get_active_students(
        &state.pool,
        filter.career.as_deref(),
        filter.course.as_deref(),
    )
    .await?;
    Ok(Json(students.into_iter().map(PublicUser::from).collect()))
}

async fn get_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PublicUser>> {
    user.require_admin()?;
    let found = db::find_user_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(found.into()))
}

async fn update_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    user.require_admin()?;
    let changes = UserChanges {
        first_name: optional_min_chars("first_name", payload.first_name.as_deref(), 2)?
            .map(str::to_string),
        last_name: optional_min_chars("last_name", payload.last_name.as_deref(), 2)?
            .map(str::to_string),
        role: payload.role,
        career: payload.career,
        course: payload.course,
        parallel: payload.parallel,
        is_active: payload.is_active,
    };
    let updated = db::update_user(&state.pool, id, &changes)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    tracing::info!("User {} updated by admin {}", updated.id, user.id);
    Ok(Json(updated.into()))
}

async fn delete_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    if !db::delete_user(&state.pool, id).await? {
        return Err(AppError::not_found("User"));
    }
    tracing::info!("User {} deleted by admin {}", id, user.id);
    Ok(StatusCode::NO_CONTENT)
}
