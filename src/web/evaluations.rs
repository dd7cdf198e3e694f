use crate::db::evaluations::{AnswerRow, EvaluationListRow, EvaluationRow};
use crate::error::AppResult;
use crate::services::evaluations::{self, EvaluationDetail};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateEvaluationRequest {
    pub section_id: Uuid,
    pub questionnaire_id: Uuid,
}

/// `value` is kept as raw JSON; numbers and numeric strings score, anything else scores zero.
#[derive(Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub value: Value,
}

#[derive(Deserialize)]
pub struct SectionFilter {
    pub section_id: Option<Uuid>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_evaluations).post(create_evaluation))
        .route("/:id", get(get_evaluation))
        .route("/:id/start", post(start_evaluation))
        .route("/:id/answers", post(submit_answer))
        .route("/:id/complete", post(complete_evaluation))
        .with_state(state)
}

async fn create_evaluation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(payload): Json<CreateEvaluationRequest>,
) -> AppResult<(StatusCode, Json<EvaluationRow>)> {
    let evaluation = evaluations::create(
        &state.pool,
        user.id,
        payload.section_id,
        payload.questionnaire_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(evaluation)))
}

async fn start_evaluation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EvaluationRow>> {
    Ok(Json(evaluations::start(&state.pool, user.id, id).await?))
}

async fn submit_answer(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> AppResult<Json<AnswerRow>> {
    let answer = evaluations::submit_answer(
        &state.pool,
        user.id,
        id,
        payload.question_id,
        &payload.value,
    )
    .await?;
    Ok(Json(answer))
}

async fn complete_evaluation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EvaluationRow>> {
    Ok(Json(evaluations::complete(&state.pool, user.id, id).await?))
}

async fn list_evaluations(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<SectionFilter>,
) -> AppResult<Json<Vec<EvaluationListRow>>> {
    Ok(Json(
        evaluations::list_for_user(&state.pool, user.id, filter.section_id).await?,
    ))
}

async fn get_evaluation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EvaluationDetail>> {
    Ok(Json(
        evaluations::detail(&state.pool, user.id, user.role, id).await?,
    ))
}
