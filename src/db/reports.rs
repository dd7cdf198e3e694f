//! Read-only aggregates over evaluations used by the admin panels.

use crate::domain::levels::EvaluationLevel;
use crate::domain::models::EvaluationStatus;
use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
}

impl StatusCounts {
    fn add(&mut self, status: EvaluationStatus, count: i64) {
        match status {
            EvaluationStatus::Pending => self.pending += count,
            EvaluationStatus::InProgress => self.in_progress += count,
            EvaluationStatus::Completed => self.completed += count,
        }
    }
}

pub async fn status_counts_for_section(pool: &PgPool, section_id: Uuid) -> Result<StatusCounts> {
    let rows: Vec<(EvaluationStatus, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*)
        FROM evaluations
        WHERE section_id = $1
        GROUP BY status
        "#,
    )
    .bind(section_id)
    .fetch_all(pool)
    .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        counts.add(status, count);
    }
    Ok(counts)
}

/// Levels of every completed evaluation in a section.
pub async fn completed_levels_for_section(
    pool: &PgPool,
    section_id: Uuid,
) -> Result<Vec<EvaluationLevel>> {
    let levels = sqlx::query_scalar::<_, EvaluationLevel>(
        r#"
        SELECT level
        FROM evaluations
        WHERE section_id = $1 AND status = 'completed' AND level IS NOT NULL
        "#,
    )
    .bind(section_id)
    .fetch_all(pool)
    .await?;
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_counts_accumulate_per_status() {
        let mut counts = StatusCounts::default();
        counts.add(EvaluationStatus::Pending, 2);
        counts.add(EvaluationStatus::Completed, 5);
        counts.add(EvaluationStatus::InProgress, 1);
        assert_eq!(
            counts,
            StatusCounts {
                pending: 2,
                in_progress: 1,
                completed: 5
            }
        );
    }
}
