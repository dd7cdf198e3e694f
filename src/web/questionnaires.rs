use crate::db::catalog::{self, QuestionnaireRow};
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::deletion_response;
use crate::web::session::CurrentUser;
use crate::web::validation::{min_chars, optional_min_chars};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateQuestionnaireRequest {
    pub section_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateQuestionnaireRequest {
    pub section_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct SectionFilter {
    pub section_id: Option<Uuid>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_questionnaires).post(create_questionnaire))
        .route("/active", get(list_active))
        .route(
            "/:id",
            get(get_questionnaire)
                .patch(update_questionnaire)
                .delete(delete_questionnaire),
        )
        .route("/:id/toggle-active", patch(toggle_questionnaire))
        .with_state(state)
}

async fn ensure_section(pool: &PgPool, section_id: Uuid) -> AppResult<()> {
    catalog::find_section(pool, section_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Section"))
}

async fn create_questionnaire(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<CreateQuestionnaireRequest>,
) -> AppResult<(StatusCode, Json<QuestionnaireRow>)> {
    user.require_admin()?;
    let title = min_chars("title", &payload.title, 3)?;
    ensure_section(&state.pool, payload.section_id).await?;
    let questionnaire = catalog::insert_questionnaire(
        &state.pool,
        payload.section_id,
        title,
        payload.description.as_deref(),
    )
    .await?;
    tracing::info!(
        "Questionnaire {} created in section {}",
        questionnaire.id,
        questionnaire.section_id
    );
    Ok((StatusCode::CREATED, Json(questionnaire)))
}

/// With `section_id`, only that section's active questionnaires.
async fn list_questionnaires(
    State(state): State<SharedState>,
    Query(filter): Query<SectionFilter>,
) -> AppResult<Json<Vec<QuestionnaireRow>>> {
    let active_only = filter.section_id.is_some();
    Ok(Json(
        catalog::list_questionnaires(&state.pool, filter.section_id, active_only).await?,
    ))
}

async fn list_active(
    State(state): State<SharedState>,
    Query(filter): Query<SectionFilter>,
) -> AppResult<Json<Vec<QuestionnaireRow>>> {
    Ok(Json(
        catalog::list_questionnaires(&state.pool, filter.section_id, true).await?,
    ))
}

async fn get_questionnaire(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QuestionnaireRow>> {
    let questionnaire = catalog::find_questionnaire(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Questionnaire"))?;
    Ok(Json(questionnaire))
}

async fn update_questionnaire(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionnaireRequest>,
) -> AppResult<Json<QuestionnaireRow>> {
    user.require_admin()?;
    let title = optional_min_chars("title", payload.title.as_deref(), 3)?;
    if let Some(section_id) = payload.section_id {
        ensure_section(&state.pool, section_id).await?;
    }
    let questionnaire = catalog::update_questionnaire(
        &state.pool,
        id,
        payload.section_id,
        title,
        payload.description.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Questionnaire"))?;
    Ok(Json(questionnaire))
}

async fn toggle_questionnaire(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QuestionnaireRow>> {
    user.require_admin()?;
    let questionnaire = catalog::toggle_questionnaire(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Questionnaire"))?;
    Ok(Json(questionnaire))
}

async fn delete_questionnaire(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    let deletion = catalog::delete_questionnaire(&state.pool, id).await?;
    deletion_response(deletion, "Questionnaire")
}
