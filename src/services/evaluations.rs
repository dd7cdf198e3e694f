//! Evaluation lifecycle: create, start, answer, complete.
//!
//! Every transition is guarded twice: once against the row just read, and
//! once in SQL (`status <> 'completed'`) so a concurrent completion can never
//! be overwritten.

use crate::db::catalog;
use crate::db::evaluations::{
    self as store, AnswerDetailRow, AnswerRow, EvaluationListRow, EvaluationRow,
};
use crate::domain::evaluation::{
    completion_step, compute_completion, decide_create, ensure_open, status_after_answer,
    CompletionStep, CreateDecision,
};
use crate::domain::models::UserRole;
use crate::domain::scoring::{AnswerValue, ScoredAnswer, ScoringError};
use crate::error::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Evaluation plus its answers in question order.
#[derive(Debug, Serialize)]
pub struct EvaluationDetail {
    #[serde(flatten)]
    pub evaluation: EvaluationListRow,
    pub answers: Vec<AnswerDetailRow>,
}

pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    section_id: Uuid,
    questionnaire_id: Uuid,
) -> AppResult<EvaluationRow> {
    let section = catalog::find_section(pool, section_id)
        .await?
        .ok_or_else(|| AppError::not_found("Section"))?;
    if !section.is_active {
        return Err(AppError::Forbidden(
            "This section is not available for evaluation".to_string(),
        ));
    }

    let questionnaire = catalog::find_questionnaire(pool, questionnaire_id)
        .await?
        .ok_or_else(|| AppError::not_found("Questionnaire"))?;
    if questionnaire.section_id != section.id {
        return Err(AppError::Validation(
            "Questionnaire does not belong to the section".to_string(),
        ));
    }

    let existing =
        store::find_evaluation_by_key(pool, user_id, section_id, questionnaire_id).await?;
    match decide_create(existing.as_ref().map(|e| e.status)) {
        CreateDecision::Conflict => Err(already_completed_conflict()),
        CreateDecision::ReuseExisting => existing.ok_or_else(|| AppError::not_found("Evaluation")),
        CreateDecision::Insert => {
            if let Some(created) =
                store::insert_evaluation(pool, user_id, section_id, questionnaire_id).await?
            {
                tracing::info!(
                    "Evaluation {} created for user {} in section {}",
                    created.id,
                    user_id,
                    section_id
                );
                return Ok(created);
            }
            // Lost the race against a concurrent create for the same key.
            let winner = store::find_evaluation_by_key(pool, user_id, section_id, questionnaire_id)
                .await?
                .ok_or_else(|| AppError::not_found("Evaluation"))?;
            match decide_create(Some(winner.status)) {
                CreateDecision::Conflict => Err(already_completed_conflict()),
                _ => Ok(winner),
            }
        }
    }
}

fn already_completed_conflict() -> AppError {
    AppError::Conflict("An evaluation for this questionnaire was already completed".to_string())
}

/// The caller's own evaluation; someone else's is reported as missing.
async fn owned(pool: &PgPool, user_id: Uuid, evaluation_id: Uuid) -> AppResult<EvaluationRow> {
    store::find_evaluation(pool, evaluation_id)
        .await?
        .filter(|e| e.user_id == user_id)
        .ok_or_else(|| AppError::not_found("Evaluation"))
}

pub async fn start(pool: &PgPool, user_id: Uuid, evaluation_id: Uuid) -> AppResult<EvaluationRow> {
    let evaluation = owned(pool, user_id, evaluation_id).await?;
    ensure_open(evaluation.status)?;
    store::mark_in_progress(pool, evaluation.id)
        .await?
        .ok_or_else(|| ScoringError::AlreadyCompleted.into())
}

pub async fn submit_answer(
    pool: &PgPool,
    user_id: Uuid,
    evaluation_id: Uuid,
    question_id: Uuid,
    value: &Value,
) -> AppResult<AnswerRow> {
    let evaluation = owned(pool, user_id, evaluation_id).await?;
    let next = status_after_answer(evaluation.status)?;

    let question = catalog::find_question(pool, question_id)
        .await?
        .ok_or_else(|| AppError::not_found("Question"))?;
    if question.questionnaire_id != evaluation.questionnaire_id {
        return Err(AppError::Validation(
            "Question does not belong to this evaluation's questionnaire".to_string(),
        ));
    }

    let score = question.scale()?.score(&AnswerValue::from(value));

    if evaluation.status != next {
        store::mark_in_progress(pool, evaluation.id)
            .await?
            .ok_or(ScoringError::AlreadyCompleted)?;
    }

    let answer = store::upsert_answer(pool, evaluation.id, question.id, value, score)
        .await?
        .ok_or(ScoringError::AlreadyCompleted)?;
    Ok(answer)
}

/// Computes and freezes totals and level. Completing an already completed
/// evaluation returns the frozen record unchanged.
pub async fn complete(
    pool: &PgPool,
    user_id: Uuid,
    evaluation_id: Uuid,
) -> AppResult<EvaluationRow> {
    let evaluation = store::find_evaluation(pool, evaluation_id)
        .await?
        .ok_or_else(|| AppError::not_found("Evaluation"))?;
    if evaluation.user_id != user_id {
        return Err(AppError::Forbidden(
            "You cannot complete another user's evaluation".to_string(),
        ));
    }
    if completion_step(evaluation.status) == CompletionStep::ReturnFrozen {
        return Ok(evaluation);
    }

    let answers = store::answer_details(pool, evaluation.id).await?;
    let scored = answers
        .iter()
        .map(AnswerDetailRow::scored)
        .collect::<Result<Vec<ScoredAnswer>, _>>()?;
    let config = store::find_active_config_for_section(pool, evaluation.section_id).await?;
    let completion = compute_completion(&scored, config.as_ref().map(|c| &c.ranges.0))?;

    match store::complete_evaluation(pool, evaluation.id, &completion.totals, completion.level)
        .await?
    {
        Some(completed) => {
            tracing::info!(
                "Evaluation {} completed: {:.2}/{:.2} ({})",
                completed.id,
                completion.totals.total_score,
                completion.totals.max_score,
                completion.level.as_str()
            );
            Ok(completed)
        }
        // A concurrent request completed it first; its result is the frozen one.
        None => frozen_winner(pool, evaluation.id).await,
    }
}

async fn frozen_winner(pool: &PgPool, evaluation_id: Uuid) -> AppResult<EvaluationRow> {
    let winner = store::find_evaluation(pool, evaluation_id)
        .await?
        .ok_or_else(|| AppError::not_found("Evaluation"))?;
    match completion_step(winner.status) {
        CompletionStep::ReturnFrozen => Ok(winner),
        CompletionStep::Compute => Err(AppError::InvalidState(
            "Evaluation changed while completing; retry".to_string(),
        )),
    }
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    section_id: Option<Uuid>,
) -> AppResult<Vec<EvaluationListRow>> {
    Ok(store::list_user_evaluations(pool, user_id, section_id).await?)
}

/// Owners read their own evaluations; admins read any.
pub async fn detail(
    pool: &PgPool,
    viewer_id: Uuid,
    viewer_role: UserRole,
    evaluation_id: Uuid,
) -> AppResult<EvaluationDetail> {
    let evaluation = store::find_evaluation_listing(pool, evaluation_id)
        .await?
        .filter(|e| viewer_role == UserRole::Admin || e.evaluation.user_id == viewer_id)
        .ok_or_else(|| AppError::not_found("Evaluation"))?;
    let answers = store::answer_details(pool, evaluation.evaluation.id).await?;
    Ok(EvaluationDetail { evaluation, answers })
}
