use crate::db::catalog::{self, NewQuestion, QuestionRow};
use crate::domain::scoring::ScaleSpec;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::deletion_response;
use crate::web::session::CurrentUser;
use crate::web::validation::min_chars;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const DEFAULT_MIN_SCALE: f64 = 1.0;
const DEFAULT_MAX_SCALE: f64 = 10.0;
const DEFAULT_POINTS: f64 = 1.0;

#[derive(Deserialize)]
pub struct QuestionFields {
    pub text: String,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
    pub points: Option<f64>,
    pub order: i32,
}

#[derive(Deserialize)]
pub struct CreateQuestionRequest {
    pub questionnaire_id: Uuid,
    #[serde(flatten)]
    pub fields: QuestionFields,
}

#[derive(Deserialize)]
pub struct BulkCreateRequest {
    pub questionnaire_id: Uuid,
    pub questions: Vec<QuestionFields>,
}

#[derive(Deserialize)]
pub struct UpdateQuestionRequest {
    pub questionnaire_id: Option<Uuid>,
    pub text: Option<String>,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
    pub points: Option<f64>,
    pub order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub questionnaire_id: Uuid,
    pub question_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct ReorderResponse {
    pub updated: u64,
}

#[derive(Deserialize)]
pub struct QuestionnaireFilter {
    pub questionnaire_id: Option<Uuid>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_questions).post(create_question))
        .route("/bulk", post(bulk_create))
        .route("/reorder", post(reorder))
        .route(
            "/:id",
            get(get_question).patch(update_question).delete(delete_question),
        )
        .route("/:id/toggle-active", patch(toggle_question))
        .with_state(state)
}

fn check_order(order: i32) -> AppResult<()> {
    if order < 0 {
        return Err(AppError::Validation("order must be zero or greater".to_string()));
    }
    Ok(())
}

/// Validated insert row with scale defaults applied.
fn new_question(questionnaire_id: Uuid, fields: &QuestionFields) -> AppResult<NewQuestion<'_>> {
    let text = min_chars("text", &fields.text, 1)?;
    check_order(fields.order)?;
    let min_scale = fields.min_scale.unwrap_or(DEFAULT_MIN_SCALE);
    let max_scale = fields.max_scale.unwrap_or(DEFAULT_MAX_SCALE);
    let points = fields.points.unwrap_or(DEFAULT_POINTS);
    ScaleSpec::new(min_scale, max_scale, points)?;
    Ok(NewQuestion {
        questionnaire_id,
        text,
        min_scale,
        max_scale,
        points,
        sort_order: fields.order,
    })
}

/// Applies the patch and re-validates the merged scale.
fn merged_question(
    mut question: QuestionRow,
    patch: UpdateQuestionRequest,
) -> AppResult<QuestionRow> {
    if let Some(text) = patch.text.as_deref() {
        question.text = min_chars("text", text, 1)?.to_string();
    }
    if let Some(order) = patch.order {
        check_order(order)?;
        question.sort_order = order;
    }
    if let Some(questionnaire_id) = patch.questionnaire_id {
        question.questionnaire_id = questionnaire_id;
    }
    question.min_scale = patch.min_scale.unwrap_or(question.min_scale);
    question.max_scale = patch.max_scale.unwrap_or(question.max_scale);
    question.points = patch.points.unwrap_or(question.points);
    question.is_active = patch.is_active.unwrap_or(question.is_active);
    question.scale()?;
    Ok(question)
}

async fn ensure_questionnaire(pool: &PgPool, questionnaire_id: Uuid) -> AppResult<()> {
    catalog::find_questionnaire(pool, questionnaire_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Questionnaire"))
}

async fn create_question(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<CreateQuestionRequest>,
) -> AppResult<(StatusCode, Json<QuestionRow>)> {
    user.require_admin()?;
    let question = new_question(payload.questionnaire_id, &payload.fields)?;
    ensure_questionnaire(&state.pool, payload.questionnaire_id).await?;
    let created = catalog::insert_question(&state.pool, &question).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// All or nothing: one invalid question rejects the whole batch.
async fn bulk_create(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<BulkCreateRequest>,
) -> AppResult<(StatusCode, Json<Vec<QuestionRow>>)> {
    user.require_admin()?;
    if payload.questions.is_empty() {
        return Err(AppError::Validation("questions must not be empty".to_string()));
    }
    let questions = payload
        .questions
        .iter()
        .map(|fields| new_question(payload.questionnaire_id, fields))
        .collect::<AppResult<Vec<_>>>()?;
    ensure_questionnaire(&state.pool, payload.questionnaire_id).await?;
    let created = catalog::insert_questions(&state.pool, &questions).await?;
    tracing::info!(
        "Created {} questions in questionnaire {}",
        created.len(),
        payload.questionnaire_id
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// With `questionnaire_id`, only that questionnaire's active questions.
async fn list_questions(
    State(state): State<SharedState>,
    Query(filter): Query<QuestionnaireFilter>,
) -> AppResult<Json<Vec<QuestionRow>>> {
    Ok(Json(
        catalog::list_questions(&state.pool, filter.questionnaire_id).await?,
    ))
}

async fn get_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QuestionRow>> {
    let question = catalog::find_question(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Question"))?;
    Ok(Json(question))
}

async fn update_question(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> AppResult<Json<QuestionRow>> {
    user.require_admin()?;
    let current = catalog::find_question(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Question"))?;
    if let Some(questionnaire_id) = payload.questionnaire_id {
        ensure_questionnaire(&state.pool, questionnaire_id).await?;
    }
    let merged = merged_question(current, payload)?;
    let updated = catalog::update_question(&state.pool, &merged)
        .await?
        .ok_or_else(|| AppError::not_found("Question"))?;
    Ok(Json(updated))
}

async fn reorder(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<ReorderRequest>,
) -> AppResult<Json<ReorderResponse>> {
    user.require_admin()?;
    ensure_questionnaire(&state.pool, payload.questionnaire_id).await?;
    let updated = catalog::reorder_questions(
        &state.pool,
        payload.questionnaire_id,
        &payload.question_ids,
    )
    .await?;
    Ok(Json(ReorderResponse { updated }))
}

async fn toggle_question(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QuestionRow>> {
    user.require_admin()?;
    let question = catalog::toggle_question(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Question"))?;
    Ok(Json(question))
}

async fn delete_question(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    let deletion = catalog::delete_question(&state.pool, id).await?;
    deletion_response(deletion, "Question")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fields(min: Option<f64>, max: Option<f64>, order: i32) -> QuestionFields {
        QuestionFields {
            text: "¿Trabajas bien en equipo?".into(),
            min_scale: min,
            max_scale: max,
            points: None,
            order,
        }
    }

    fn stored() -> QuestionRow {
        QuestionRow {
            id: Uuid::new_v4(),
            questionnaire_id: Uuid::new_v4(),
            text: "Comunicación".into(),
            min_scale: 1.0,
            max_scale: 5.0,
            points: 2.0,
            sort_order: 1,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn patch() -> UpdateQuestionRequest {
        UpdateQuestionRequest {
            questionnaire_id: None,
            text: None,
            min_scale: None,
            max_scale: None,
            points: None,
            order: None,
            is_active: None,
        }
    }

    #[test]
    fn new_question_applies_scale_defaults() {
        let f = fields(None, None, 0);
        let q = new_question(Uuid::new_v4(), &f).unwrap();
        assert_eq!((q.min_scale, q.max_scale, q.points), (1.0, 10.0, 1.0));
    }

    #[test]
    fn degenerate_scale_and_negative_order_are_rejected() {
        let flat = fields(Some(5.0), Some(5.0), 1);
        assert!(matches!(new_question(Uuid::new_v4(), &flat), Err(AppError::Validation(_))));
        let negative = fields(None, None, -1);
        assert!(matches!(new_question(Uuid::new_v4(), &negative), Err(AppError::Validation(_))));
    }

    #[test]
    fn update_revalidates_the_merged_scale() {
        // max_scale alone is fine against stored min 1.0, but not when it drops below it.
        let raise = UpdateQuestionRequest {
            max_scale: Some(7.0),
            ..patch()
        };
        let ok = merged_question(stored(), raise).unwrap();
        assert_eq!(ok.max_scale, 7.0);
        assert_eq!(ok.min_scale, 1.0);

        let below_min = UpdateQuestionRequest {
            max_scale: Some(0.5),
            ..patch()
        };
        let bad = merged_question(stored(), below_min);
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }
}
