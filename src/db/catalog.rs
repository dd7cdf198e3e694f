//! Careers, sections, questionnaires and questions.

use crate::domain::models::SectionName;
use crate::domain::scoring::{ScaleSpec, ScoringError};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

/// Outcome of deleting a catalog row that evaluation history may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    Missing,
    /// Evaluations or answers still point at the row; nothing was removed.
    InUse,
}

impl Deletion {
    fn from_outcome(outcome: std::result::Result<u64, sqlx::Error>) -> Result<Self> {
        match outcome {
            Ok(0) => Ok(Deletion::Missing),
            Ok(_) => Ok(Deletion::Deleted),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Ok(Deletion::InUse),
            Err(e) => Err(e.into()),
        }
    }
}

async fn delete_referenced(pool: &PgPool, sql: &str, id: Uuid) -> Result<Deletion> {
    let outcome = sqlx::query(sql)
        .bind(id)
        .execute(pool)
        .await
        .map(|result| result.rows_affected());
    Deletion::from_outcome(outcome)
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CareerRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SectionRow {
    pub id: Uuid,
    pub name: SectionName,
    pub display_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuestionnaireRow {
    pub id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub questionnaire_id: Uuid,
    pub text: String,
    pub min_scale: f64,
    pub max_scale: f64,
    pub points: f64,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionRow {
    pub fn scale(&self) -> Result<ScaleSpec, ScoringError> {
        ScaleSpec::new(self.min_scale, self.max_scale, self.points)
    }
}

pub struct NewQuestion<'a> {
    pub questionnaire_id: Uuid,
    pub text: &'a str,
    pub min_scale: f64,
    pub max_scale: f64,
    pub points: f64,
    pub sort_order: i32,
}

// ============================================
// Careers
// ============================================

pub async fn insert_career(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    is_active: bool,
) -> Result<Option<CareerRow>> {
    let career = sqlx::query_as::<_, CareerRow>(
        r#"
        INSERT INTO careers (id, name, description, is_active)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;
    Ok(career)
}

pub async fn list_careers(pool: &PgPool, active_only: bool) -> Result<Vec<CareerRow>> {
    let careers = sqlx::query_as::<_, CareerRow>(
        "SELECT * FROM careers WHERE ($1 = false OR is_active = true) ORDER BY name",
    )
    .bind(active_only)
    .fetch_all(pool)
    .await?;
    Ok(careers)
}

pub async fn find_career(pool: &PgPool, id: Uuid) -> Result<Option<CareerRow>> {
    let career = sqlx::query_as::<_, CareerRow>("SELECT * FROM careers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(career)
}

pub async fn career_name_taken(pool: &PgPool, name: &str, except: Option<Uuid>) -> Result<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM careers WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(name)
    .bind(except)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn update_career(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    is_active: Option<bool>,
) -> Result<Option<CareerRow>> {
    let career = sqlx::query_as::<_, CareerRow>(
        r#"
        UPDATE careers
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            is_active = COALESCE($4, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;
    Ok(career)
}

pub async fn toggle_career(pool: &PgPool, id: Uuid) -> Result<Option<CareerRow>> {
    let career = sqlx::query_as::<_, CareerRow>(
        "UPDATE careers SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(career)
}

pub async fn delete_career(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM careers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================
// Sections
// ============================================

/// Returns `None` when a section with that name already exists.
pub async fn insert_section(
    pool: &PgPool,
    name: SectionName,
    display_name: &str,
    description: Option<&str>,
) -> Result<Option<SectionRow>> {
    let section = sqlx::query_as::<_, SectionRow>(
        r#"
        INSERT INTO sections (id, name, display_name, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(display_name)
    .bind(description)
    .fetch_optional(pool)
    .await?;
    Ok(section)
}

pub async fn list_sections(pool: &PgPool, active_only: bool) -> Result<Vec<SectionRow>> {
    let sections = sqlx::query_as::<_, SectionRow>(
        "SELECT * FROM sections WHERE ($1 = false OR is_active = true) ORDER BY name",
    )
    .bind(active_only)
    .fetch_all(pool)
    .await?;
    Ok(sections)
}

pub async fn find_section(pool: &PgPool, id: Uuid) -> Result<Option<SectionRow>> {
    let section = sqlx::query_as::<_, SectionRow>("SELECT * FROM sections WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(section)
}

pub async fn find_section_by_name(pool: &PgPool, name: SectionName) -> Result<Option<SectionRow>> {
    let section = sqlx::query_as::<_, SectionRow>("SELECT * FROM sections WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(section)
}

pub async fn update_section(
    pool: &PgPool,
    id: Uuid,
    display_name: Option<&str>,
    description: Option<&str>,
    is_active: Option<bool>,
) -> Result<Option<SectionRow>> {
    let section = sqlx::query_as::<_, SectionRow>(
        r#"
        UPDATE sections
        SET display_name = COALESCE($2, display_name),
            description = COALESCE($3, description),
            is_active = COALESCE($4, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(display_name)
    .bind(description)
    .bind(is_active)
    .fetch_optional(pool)
    .await?;
    Ok(section)
}

pub async fn toggle_section(pool: &PgPool, id: Uuid) -> Result<Option<SectionRow>> {
    let section = sqlx::query_as::<_, SectionRow>(
        "UPDATE sections SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(section)
}

pub async fn delete_section(pool: &PgPool, id: Uuid) -> Result<Deletion> {
    delete_referenced(pool, "DELETE FROM sections WHERE id = $1", id).await
}

// ============================================
// Questionnaires
// ============================================

pub async fn insert_questionnaire(
    pool: &PgPool,
    section_id: Uuid,
    title: &str,
    description: Option<&str>,
) -> Result<QuestionnaireRow> {
    let questionnaire = sqlx::query_as::<_, QuestionnaireRow>(
        r#"
        INSERT INTO questionnaires (id, section_id, title, description)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(section_id)
    .bind(title)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(questionnaire)
}

/// Newest first, optionally narrowed to one section.
pub async fn list_questionnaires(
    pool: &PgPool,
    section_id: Option<Uuid>,
    active_only: bool,
) -> Result<Vec<QuestionnaireRow>> {
    let questionnaires = sqlx::query_as::<_, QuestionnaireRow>(
        r#"
        SELECT *
        FROM questionnaires
        WHERE ($1::uuid IS NULL OR section_id = $1)
          AND ($2 = false OR is_active = true)
        ORDER BY created_at DESC
        "#,
    )
    .bind(section_id)
    .bind(active_only)
    .fetch_all(pool)
    .await?;
    Ok(questionnaires)
}

pub async fn find_questionnaire(pool: &PgPool, id: Uuid) -> Result<Option<QuestionnaireRow>> {
    let questionnaire =
        sqlx::query_as::<_, QuestionnaireRow>("SELECT * FROM questionnaires WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(questionnaire)
}

pub async fn update_questionnaire(
    pool: &PgPool,
    id: Uuid,
    section_id: Option<Uuid>,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<Option<QuestionnaireRow>> {
    let questionnaire = sqlx::query_as::<_, QuestionnaireRow>(
        r#"
        UPDATE questionnaires
        SET section_id = COALESCE($2, section_id),
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(section_id)
    .bind(title)
    .bind(description)
    .fetch_optional(pool)
    .await?;
    Ok(questionnaire)
}

pub async fn toggle_questionnaire(pool: &PgPool, id: Uuid) -> Result<Option<QuestionnaireRow>> {
    let questionnaire = sqlx::query_as::<_, QuestionnaireRow>(
        "UPDATE questionnaires SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(questionnaire)
}

pub async fn delete_questionnaire(pool: &PgPool, id: Uuid) -> Result<Deletion> {
    delete_referenced(pool, "DELETE FROM questionnaires WHERE id = $1", id).await
}

// ============================================
// Questions
// ============================================

pub async fn insert_question<'e, E>(executor: E, question: &NewQuestion<'_>) -> Result<QuestionRow>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, QuestionRow>(
        r#"
        INSERT INTO questions (id, questionnaire_id, text, min_scale, max_scale, points, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(question.questionnaire_id)
    .bind(question.text)
    .bind(question.min_scale)
    .bind(question.max_scale)
    .bind(question.points)
    .bind(question.sort_order)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

/// Inserts every question or none of them.
pub async fn insert_questions(
    pool: &PgPool,
    questions: &[NewQuestion<'_>],
) -> Result<Vec<QuestionRow>> {
    let mut tx = pool.begin().await?;
    let mut created = Vec::with_capacity(questions.len());
    for question in questions {
        created.push(insert_question(&mut *tx, question).await?);
    }
    tx.commit().await?;
    Ok(created)
}

/// All questions by display order, or the active ones of one questionnaire.
pub async fn list_questions(
    pool: &PgPool,
    questionnaire_id: Option<Uuid>,
) -> Result<Vec<QuestionRow>> {
    let questions = sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT *
        FROM questions
        WHERE $1::uuid IS NULL OR (questionnaire_id = $1 AND is_active = true)
        ORDER BY sort_order, created_at
        "#,
    )
    .bind(questionnaire_id)
    .fetch_all(pool)
    .await?;
    Ok(questions)
}

pub async fn find_question(pool: &PgPool, id: Uuid) -> Result<Option<QuestionRow>> {
    let question = sqlx::query_as::<_, QuestionRow>("SELECT * FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(question)
}

/// Overwrites the editable fields; callers merge and validate first.
pub async fn update_question(pool: &PgPool, question: &QuestionRow) -> Result<Option<QuestionRow>> {
    let row = sqlx::query_as::<_, QuestionRow>(
        r#"
        UPDATE questions
        SET questionnaire_id = $2,
            text = $3,
            min_scale = $4,
            max_scale = $5,
            points = $6,
            sort_order = $7,
            is_active = $8,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(question.id)
    .bind(question.questionnaire_id)
    .bind(&question.text)
    .bind(question.min_scale)
    .bind(question.max_scale)
    .bind(question.points)
    .bind(question.sort_order)
    .bind(question.is_active)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Assigns order 1..n following `question_ids`; ids outside the questionnaire are skipped.
pub async fn reorder_questions(
    pool: &PgPool,
    questionnaire_id: Uuid,
    question_ids: &[Uuid],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for (idx, id) in question_ids.iter().enumerate() {
        let result = sqlx::query(
            "UPDATE questions SET sort_order = $1, updated_at = NOW() WHERE id = $2 AND questionnaire_id = $3",
        )
        .bind((idx + 1) as i32)
        .bind(id)
        .bind(questionnaire_id)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

pub async fn toggle_question(pool: &PgPool, id: Uuid) -> Result<Option<QuestionRow>> {
    let question = sqlx::query_as::<_, QuestionRow>(
        "UPDATE questions SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(question)
}

pub async fn delete_question(pool: &PgPool, id: Uuid) -> Result<Deletion> {
    delete_referenced(pool, "DELETE FROM questions WHERE id = $1", id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = include_str!("../../migrations/20240101000000_init.sql");

    #[test]
    fn deletion_outcome_follows_rows_affected() {
        assert_eq!(Deletion::from_outcome(Ok(0)).unwrap(), Deletion::Missing);
        assert_eq!(Deletion::from_outcome(Ok(1)).unwrap(), Deletion::Deleted);
        assert!(Deletion::from_outcome(Err(sqlx::Error::RowNotFound)).is_err());
    }

    #[test]
    fn evaluation_history_blocks_catalog_deletes() {
        for reference in [
            "section_id UUID NOT NULL REFERENCES sections (id) ON DELETE RESTRICT",
            "questionnaire_id UUID NOT NULL REFERENCES questionnaires (id) ON DELETE RESTRICT",
            "question_id UUID NOT NULL REFERENCES questions (id) ON DELETE RESTRICT",
        ] {
            assert!(SCHEMA.contains(reference), "{reference}");
        }
    }
}
