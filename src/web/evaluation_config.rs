use crate::db::catalog;
use crate::db::evaluations::{self as store, EvaluationConfigRow};
use crate::domain::levels::{LevelRanges, LevelRangesPatch};
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateConfigRequest {
    pub section_id: Uuid,
    #[serde(flatten)]
    pub ranges: LevelRanges,
}

#[derive(Deserialize)]
pub struct SectionFilter {
    pub section_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub id: Uuid,
    pub section_id: Uuid,
    #[serde(flatten)]
    pub ranges: LevelRanges,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EvaluationConfigRow> for ConfigResponse {
    fn from(row: EvaluationConfigRow) -> Self {
        ConfigResponse {
            id: row.id,
            section_id: row.section_id,
            ranges: row.ranges.0,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_configs).post(create_config))
        .route("/:id", get(get_config).patch(update_config).delete(delete_config))
        .route("/:id/toggle-active", patch(toggle_config))
        .with_state(state)
}

async fn create_config(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<CreateConfigRequest>,
) -> AppResult<(StatusCode, Json<ConfigResponse>)> {
    user.require_admin()?;
    payload.ranges.validate()?;
    catalog::find_section(&state.pool, payload.section_id)
        .await?
        .ok_or_else(|| AppError::not_found("Section"))?;
    let config = store::insert_config(&state.pool, payload.section_id, &payload.ranges)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("This section already has an evaluation configuration".to_string())
        })?;
    tracing::info!("Evaluation config {} created for section {}", config.id, config.section_id);
    Ok((StatusCode::CREATED, Json(config.into())))
}

/// With `section_id`, the section's active configuration (or none).
async fn list_configs(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<SectionFilter>,
) -> AppResult<Json<Vec<ConfigResponse>>> {
    user.require_admin()?;
    let configs: Vec<EvaluationConfigRow> = match filter.section_id {
        Some(section_id) => store::find_active_config_for_section(&state.pool, section_id)
            .await?
            .into_iter()
            .collect(),
        None => store::list_configs(&state.pool).await?,
    };
    Ok(Json(configs.into_iter().map(ConfigResponse::from).collect()))
}

async fn get_config(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConfigResponse>> {
    user.require_admin()?;
    let config = store::find_config(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Evaluation configuration"))?;
    Ok(Json(config.into()))
}

/// Partial update: given ranges replace stored ones, then the merged set is validated.
async fn update_config(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<LevelRangesPatch>,
) -> AppResult<Json<ConfigResponse>> {
    user.require_admin()?;
    let current = store::find_config(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Evaluation configuration"))?;
    if patch.is_empty() {
        return Ok(Json(current.into()));
    }
    let merged = current.ranges.merged(&patch);
    merged.validate()?;
    let config = store::update_config_ranges(&state.pool, id, &merged)
        .await?
        .ok_or_else(|| AppError::not_found("Evaluation configuration"))?;
    tracing::info!("Evaluation config {} ranges updated", config.id);
    Ok(Json(config.into()))
}

async fn toggle_config(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConfigResponse>> {
    user.require_admin()?;
    let config = store::toggle_config(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Evaluation configuration"))?;
    Ok(Json(config.into()))
}

async fn delete_config(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    if !store::delete_config(&state.pool, id).await? {
        return Err(AppError::not_found("Evaluation configuration"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_payload_carries_ranges_inline() {
        let payload: CreateConfigRequest = serde_json::from_value(json!({
            "section_id": Uuid::nil(),
            "muy_bajo": {"min": 0, "max": 20},
            "bajo": {"min": 21, "max": 40},
            "intermedio": {"min": 41, "max": 60},
            "alto": {"min": 61, "max": 80},
            "muy_alto": {"min": 81, "max": 100}
        }))
        .unwrap();
        assert_eq!(payload.ranges, LevelRanges::DEFAULT);
    }

    #[test]
    fn partial_update_is_validated_after_merging() {
        let patch: LevelRangesPatch = serde_json::from_value(json!({
            "bajo": {"min": 15, "max": 40}
        }))
        .unwrap();
        let merged = LevelRanges::DEFAULT.merged(&patch);
        assert!(merged.validate().is_err());
    }
}
