use crate::db::catalog::{self, SectionRow};
use crate::domain::models::SectionName;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::deletion_response;
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
pub struct CreateSectionRequest {
    pub name: SectionName,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateSectionRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_sections).post(create_section))
        .route("/active", get(list_active))
        .route(
            "/:id",
            get(get_section).patch(update_section).delete(delete_section),
        )
        .route("/:id/toggle-active", patch(toggle_section))
        .with_state(state)
}

async fn create_section(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<CreateSectionRequest>,
) -> AppResult<(StatusCode, Json<SectionRow>)> {
    user.require_admin()?;
    let display_name = match payload.display_name.as_deref() {
        Some(name) => min_chars("display_name", name, 3)?,
        None => payload.name.default_display_name(),
    };
    let section = catalog::insert_section(
        &state.pool,
        payload.name,
        display_name,
        payload.description.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::Conflict("A section with this name already exists".to_string()))?;
    tracing::info!("Section {} created", section.id);
    Ok((StatusCode::CREATED, Json(section)))
}

async fn list_sections(State(state): State<SharedState>) -> AppResult<Json<Vec<SectionRow>>> {
    Ok(Json(catalog::list_sections(&state.pool, false).await?))
}

async fn list_active(State(state): State<SharedState>) -> AppResult<Json<Vec<SectionRow>>> {
    Ok(Json(catalog::list_sections(&state.pool, true).await?))
}

async fn get_section(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SectionRow>> {
    let section = catalog::find_section(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Section"))?;
    Ok(Json(section))
}

async fn update_section(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSectionRequest>,
) -> AppResult<Json<SectionRow>> {
    user.require_admin()?;
    let display_name = optional_min_chars("display_name", payload.display_name.as_deref(), 3)?;
    let section = catalog::update_section(
        &state.pool,
        id,
        display_name,
        payload.description.as_deref(),
        payload.is_active,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Section"))?;
    Ok(Json(section))
}

async fn toggle_section(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SectionRow>> {
    user.require_admin()?;
    let section = catalog::toggle_section(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Section"))?;
    tracing::info!("Section {} active = {}", section.id, section.is_active);
    Ok(Json(section))
}

async fn delete_section(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    let deletion = catalog::delete_section(&state.pool, id).await?;
    deletion_response(deletion, "Section")
}
