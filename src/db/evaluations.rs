//! Evaluation configs, evaluations and answers.

use crate::domain::levels::{EvaluationLevel, LevelRanges};
use crate::domain::models::EvaluationStatus;
use crate::domain::scoring::{AnswerValue, ScaleSpec, ScoredAnswer, ScoringError, Totals};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct EvaluationConfigRow {
    pub id: Uuid,
    pub section_id: Uuid,
    pub ranges: Json<LevelRanges>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EvaluationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub section_id: Uuid,
    pub questionnaire_id: Uuid,
    pub status: EvaluationStatus,
    pub total_score: Option<f64>,
    pub max_score: Option<f64>,
    pub level: Option<EvaluationLevel>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Evaluation with the names of the section and questionnaire it belongs to.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EvaluationListRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub evaluation: EvaluationRow,
    pub section_display_name: String,
    pub questionnaire_title: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnswerRow {
    pub id: Uuid,
    pub evaluation_id: Uuid,
    pub question_id: Uuid,
    pub value: Value,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Answer joined with its question, in question display order.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnswerDetailRow {
    pub id: Uuid,
    pub question_id: Uuid,
    pub question_text: String,
    pub question_order: i32,
    pub min_scale: f64,
    pub max_scale: f64,
    pub points: f64,
    pub value: Value,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl AnswerDetailRow {
    /// Rescores the stored value against the question's current scale, so an
    /// edit to `points` after answering cannot push the score above the maximum.
    pub fn scored(&self) -> Result<ScoredAnswer, ScoringError> {
        let scale = ScaleSpec::new(self.min_scale, self.max_scale, self.points)?;
        Ok(ScoredAnswer {
            score: Some(scale.score(&AnswerValue::from(&self.value))),
            points: scale.points(),
        })
    }
}

const LIST_SELECT: &str = r#"
    SELECT e.*, s.display_name AS section_display_name, q.title AS questionnaire_title
    FROM evaluations e
    JOIN sections s ON s.id = e.section_id
    JOIN questionnaires q ON q.id = e.questionnaire_id
"#;

// ============================================
// Evaluation configs
// ============================================

/// Returns `None` when the section already has a configuration.
pub async fn insert_config(
    pool: &PgPool,
    section_id: Uuid,
    ranges: &LevelRanges,
) -> Result<Option<EvaluationConfigRow>> {
    let config = sqlx::query_as::<_, EvaluationConfigRow>(
        r#"
        INSERT INTO evaluation_configs (id, section_id, ranges)
        VALUES ($1, $2, $3)
        ON CONFLICT (section_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(section_id)
    .bind(Json(ranges))
    .fetch_optional(pool)
    .await?;
    Ok(config)
}

pub async fn list_configs(pool: &PgPool) -> Result<Vec<EvaluationConfigRow>> {
    let configs = sqlx::query_as::<_, EvaluationConfigRow>(
        "SELECT * FROM evaluation_configs ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(configs)
}

pub async fn find_config(pool: &PgPool, id: Uuid) -> Result<Option<EvaluationConfigRow>> {
    let config =
        sqlx::query_as::<_, EvaluationConfigRow>("SELECT * FROM evaluation_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(config)
}

/// The configuration classification uses: the section's, and only while active.
pub async fn find_active_config_for_section(
    pool: &PgPool,
    section_id: Uuid,
) -> Result<Option<EvaluationConfigRow>> {
    let config = sqlx::query_as::<_, EvaluationConfigRow>(
        "SELECT * FROM evaluation_configs WHERE section_id = $1 AND is_active = true",
    )
    .bind(section_id)
    .fetch_optional(pool)
    .await?;
    Ok(config)
}

pub async fn update_config_ranges(
    pool: &PgPool,
    id: Uuid,
    ranges: &LevelRanges,
) -> Result<Option<EvaluationConfigRow>> {
    let config = sqlx::query_as::<_, EvaluationConfigRow>(
        "UPDATE evaluation_configs SET ranges = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(Json(ranges))
    .fetch_optional(pool)
    .await?;
    Ok(config)
}

pub async fn toggle_config(pool: &PgPool, id: Uuid) -> Result<Option<EvaluationConfigRow>> {
    let config = sqlx::query_as::<_, EvaluationConfigRow>(
        "UPDATE evaluation_configs SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(config)
}

pub async fn delete_config(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM evaluation_configs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================
// Evaluations
// ============================================

pub async fn find_evaluation_by_key(
    pool: &PgPool,
    user_id: Uuid,
    section_id: Uuid,
    questionnaire_id: Uuid,
) -> Result<Option<EvaluationRow>> {
    let evaluation = sqlx::query_as::<_, EvaluationRow>(
        r#"
        SELECT *
        FROM evaluations
        WHERE user_id = $1 AND section_id = $2 AND questionnaire_id = $3
        "#,
    )
    .bind(user_id)
    .bind(section_id)
    .bind(questionnaire_id)
    .fetch_optional(pool)
    .await?;
    Ok(evaluation)
}

/// Inserts a pending evaluation. Returns `None` when a concurrent request
/// already created one for the same (user, section, questionnaire).
pub async fn insert_evaluation(
    pool: &PgPool,
    user_id: Uuid,
    section_id: Uuid,
    questionnaire_id: Uuid,
) -> Result<Option<EvaluationRow>> {
    let evaluation = sqlx::query_as::<_, EvaluationRow>(
        r#"
        INSERT INTO evaluations (id, user_id, section_id, questionnaire_id, status)
        VALUES ($1, $2, $3, $4, 'pending')
        ON CONFLICT (user_id, section_id, questionnaire_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(section_id)
    .bind(questionnaire_id)
    .fetch_optional(pool)
    .await?;
    Ok(evaluation)
}

pub async fn find_evaluation(pool: &PgPool, id: Uuid) -> Result<Option<EvaluationRow>> {
    let evaluation = sqlx::query_as::<_, EvaluationRow>("SELECT * FROM evaluations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(evaluation)
}

pub async fn find_evaluation_listing(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<EvaluationListRow>> {
    let sql = format!("{LIST_SELECT} WHERE e.id = $1");
    let evaluation = sqlx::query_as::<_, EvaluationListRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(evaluation)
}

/// Moves a non-completed evaluation to in_progress, keeping the first start time.
pub async fn mark_in_progress(pool: &PgPool, id: Uuid) -> Result<Option<EvaluationRow>> {
    let evaluation = sqlx::query_as::<_, EvaluationRow>(
        r#"
        UPDATE evaluations
        SET status = 'in_progress',
            started_at = COALESCE(started_at, NOW()),
            updated_at = NOW()
        WHERE id = $1 AND status <> 'completed'
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(evaluation)
}

/// Freezes score and level. Returns `None` if the evaluation was already completed.
pub async fn complete_evaluation(
    pool: &PgPool,
    id: Uuid,
    totals: &Totals,
    level: EvaluationLevel,
) -> Result<Option<EvaluationRow>> {
    let evaluation = sqlx::query_as::<_, EvaluationRow>(
        r#"
        UPDATE evaluations
        SET status = 'completed',
            total_score = $2,
            max_score = $3,
            level = $4,
            started_at = COALESCE(started_at, NOW()),
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status <> 'completed'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(totals.total_score)
    .bind(totals.max_score)
    .bind(level)
    .fetch_optional(pool)
    .await?;
    Ok(evaluation)
}

/// A user's evaluations, newest first, optionally for one section.
pub async fn list_user_evaluations(
    pool: &PgPool,
    user_id: Uuid,
    section_id: Option<Uuid>,
) -> Result<Vec<EvaluationListRow>> {
    let sql = format!(
        r#"{LIST_SELECT}
        WHERE e.user_id = $1 AND ($2::uuid IS NULL OR e.section_id = $2)
        ORDER BY e.created_at DESC"#
    );
    let evaluations = sqlx::query_as::<_, EvaluationListRow>(&sql)
        .bind(user_id)
        .bind(section_id)
        .fetch_all(pool)
        .await?;
    Ok(evaluations)
}

/// Completed evaluations of the given users, optionally for one section.
pub async fn list_completed_for_users(
    pool: &PgPool,
    user_ids: &[Uuid],
    section_id: Option<Uuid>,
) -> Result<Vec<EvaluationListRow>> {
    let sql = format!(
        r#"{LIST_SELECT}
        WHERE e.user_id = ANY($1)
          AND e.status = 'completed'
          AND ($2::uuid IS NULL OR e.section_id = $2)
        ORDER BY e.created_at DESC"#
    );
    let evaluations = sqlx::query_as::<_, EvaluationListRow>(&sql)
        .bind(user_ids)
        .bind(section_id)
        .fetch_all(pool)
        .await?;
    Ok(evaluations)
}

// ============================================
// Answers
// ============================================

/// One answer per (evaluation, question): resubmission overwrites value and score.
/// Returns `None` once the evaluation is completed.
pub async fn upsert_answer(
    pool: &PgPool,
    evaluation_id: Uuid,
    question_id: Uuid,
    value: &Value,
    score: f64,
) -> Result<Option<AnswerRow>> {
    let answer = sqlx::query_as::<_, AnswerRow>(
        r#"
        INSERT INTO answers (id, evaluation_id, question_id, value, score)
        SELECT $1, $2, $3, $4, $5
        WHERE EXISTS (
            SELECT 1 FROM evaluations WHERE id = $2 AND status <> 'completed'
        )
        ON CONFLICT (evaluation_id, question_id) DO UPDATE
        SET value = EXCLUDED.value,
            score = EXCLUDED.score
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(evaluation_id)
    .bind(question_id)
    .bind(value)
    .bind(score)
    .fetch_optional(pool)
    .await?;
    Ok(answer)
}

pub async fn answer_details(pool: &PgPool, evaluation_id: Uuid) -> Result<Vec<AnswerDetailRow>> {
    let answers = sqlx::query_as::<_, AnswerDetailRow>(
        r#"
        SELECT a.id,
               a.question_id,
               q.text AS question_text,
               q.sort_order AS question_order,
               q.min_scale,
               q.max_scale,
               q.points,
               a.value,
               a.score,
               a.created_at
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.evaluation_id = $1
        ORDER BY q.sort_order, a.created_at
        "#,
    )
    .bind(evaluation_id)
    .fetch_all(pool)
    .await?;
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer(points: f64, value: Value, stored: f64) -> AnswerDetailRow {
        AnswerDetailRow {
            id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            question_text: "Trabajo en equipo".to_string(),
            question_order: 0,
            min_scale: 1.0,
            max_scale: 10.0,
            points,
            value,
            score: Some(stored),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lowered_points_rescore_below_the_new_maximum() {
        // Answered at 10/10 while the question was worth 10 points, now worth 2.
        let scored = answer(2.0, json!(10), 10.0).scored().unwrap();
        assert_eq!(scored.score, Some(2.0));
        assert_eq!(scored.points, 2.0);
    }

    #[test]
    fn unparseable_values_rescore_to_zero() {
        let scored = answer(5.0, json!("abc"), 0.0).scored().unwrap();
        assert_eq!(scored.score, Some(0.0));
        assert_eq!(scored.points, 5.0);
    }
}
