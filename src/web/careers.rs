use crate::db::catalog::{self, CareerRow};
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use crate::web::validation::{min_chars, optional_min_chars};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateCareerRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateCareerRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_careers).post(create_career))
        .route("/active", get(list_active))
        .route(
            "/:id",
            get(get_career).patch(update_career).delete(delete_career),
        )
        .route("/:id/toggle-active", patch(toggle_career))
        .with_state(state)
}

async fn create_career(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<CreateCareerRequest>,
) -> AppResult<(StatusCode, Json<CareerRow>)> {
    user.require_admin()?;
    let name = min_chars("name", &payload.name, 2)?;
    let career = catalog::insert_career(
        &state.pool,
        name,
        payload.description.as_deref(),
        payload.is_active,
    )
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Career '{name}' already exists")))?;
    tracing::info!("Career {} created", career.id);
    Ok((StatusCode::CREATED, Json(career)))
}

async fn list_careers(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<CareerRow>>> {
    user.require_admin()?;
    Ok(Json(catalog::list_careers(&state.pool, false).await?))
}

async fn list_active(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<CareerRow>>> {
    Ok(Json(catalog::list_careers(&state.pool, true).await?))
}

async fn get_career(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CareerRow>> {
    user.require_admin()?;
    let career = catalog::find_career(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Career"))?;
    Ok(Json(career))
}

async fn update_career(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCareerRequest>,
) -> AppResult<Json<CareerRow>> {
    user.require_admin()?;
    let name = optional_min_chars("name", payload.name.as_deref(), 2)?;
    if let Some(name) = name {
        if catalog::career_name_taken(&state.pool, name, Some(id)).await? {
            return Err(AppError::Conflict(format!("Career '{name}' already exists")));
        }
    }
    let career = catalog::update_career(
        &state.pool,
        id,
        name,
        payload.description.as_deref(),
        payload.is_active,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Career"))?;
    Ok(Json(career))
}

async fn toggle_career(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CareerRow>> {
    user.require_admin()?;
    let career = catalog::toggle_career(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Career"))?;
    Ok(Json(career))
}

async fn delete_career(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    if !catalog::delete_career(&state.pool, id).await? {
        return Err(AppError::not_found("Career"));
    }
    Ok(StatusCode::NO_CONTENT)
}
