//! Read-only reports over completed evaluations.

use crate::db::catalog::{self, SectionRow};
use crate::db::evaluations::{self as store, AnswerDetailRow, EvaluationListRow};
use crate::db::{self, reports as aggregates, DbUser};
use crate::domain::levels::{rounded_percentage, EvaluationLevel};
use crate::domain::models::SectionName;
use crate::error::{AppError, AppResult};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub const NO_PARALLEL: &str = "Sin paralelo";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelsDistribution {
    pub muy_bajo: u32,
    pub bajo: u32,
    pub intermedio: u32,
    pub alto: u32,
    pub muy_alto: u32,
}

impl LevelsDistribution {
    pub fn record(&mut self, level: EvaluationLevel) {
        match level {
            EvaluationLevel::MuyBajo => self.muy_bajo += 1,
            EvaluationLevel::Bajo => self.bajo += 1,
            EvaluationLevel::Intermedio => self.intermedio += 1,
            EvaluationLevel::Alto => self.alto += 1,
            EvaluationLevel::MuyAlto => self.muy_alto += 1,
        }
    }
}

impl FromIterator<EvaluationLevel> for LevelsDistribution {
    fn from_iter<I: IntoIterator<Item = EvaluationLevel>>(iter: I) -> Self {
        let mut distribution = LevelsDistribution::default();
        for level in iter {
            distribution.record(level);
        }
        distribution
    }
}

fn distribution_of(evaluations: &[EvaluationListRow]) -> LevelsDistribution {
    evaluations.iter().filter_map(|e| e.evaluation.level).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of total scores; missing scores count as zero.
fn average_score(evaluations: &[&EvaluationListRow]) -> f64 {
    if evaluations.is_empty() {
        return 0.0;
    }
    let sum: f64 = evaluations
        .iter()
        .map(|e| e.evaluation.total_score.unwrap_or(0.0))
        .sum();
    sum / evaluations.len() as f64
}

// ============================================
// Individual
// ============================================

#[derive(Debug, Serialize)]
pub struct UserCard {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub career: Option<String>,
    pub course: Option<String>,
    pub parallel: Option<String>,
}

impl From<&DbUser> for UserCard {
    fn from(user: &DbUser) -> Self {
        UserCard {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            career: user.career.clone(),
            course: user.course.clone(),
            parallel: user.parallel.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportedEvaluation {
    #[serde(flatten)]
    pub evaluation: EvaluationListRow,
    pub percentage: f64,
    pub answers: Vec<AnswerDetailRow>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct IndividualSummary {
    pub total_evaluations: usize,
    pub completed_evaluations: usize,
    pub average_score: f64,
    pub levels_distribution: LevelsDistribution,
}

#[derive(Debug, Serialize)]
pub struct IndividualReport {
    pub user: UserCard,
    pub evaluations: Vec<ReportedEvaluation>,
    pub summary: IndividualSummary,
}

pub fn individual_summary(evaluations: &[EvaluationListRow]) -> IndividualSummary {
    let refs: Vec<&EvaluationListRow> = evaluations.iter().collect();
    IndividualSummary {
        total_evaluations: evaluations.len(),
        completed_evaluations: evaluations
            .iter()
            .filter(|e| e.evaluation.status.is_completed())
            .count(),
        average_score: average_score(&refs),
        levels_distribution: distribution_of(evaluations),
    }
}

pub async fn individual(pool: &PgPool, user_id: Uuid) -> AppResult<IndividualReport> {
    let user = db::find_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let completed = store::list_completed_for_users(pool, &[user.id], None).await?;
    let summary = individual_summary(&completed);

    let mut evaluations = Vec::with_capacity(completed.len());
    for evaluation in completed {
        let answers = store::answer_details(pool, evaluation.evaluation.id).await?;
        let stored = &evaluation.evaluation;
        let percentage = match (stored.total_score, stored.max_score) {
            (total, Some(max)) => rounded_percentage(total.unwrap_or(0.0), max),
            _ => 0.0,
        };
        evaluations.push(ReportedEvaluation {
            evaluation,
            percentage,
            answers,
        });
    }

    Ok(IndividualReport {
        user: UserCard::from(&user),
        evaluations,
        summary,
    })
}

// ============================================
// Groups
// ============================================

#[derive(Debug, PartialEq, Serialize)]
pub struct SectionScore {
    pub section_id: Uuid,
    pub section_display_name: String,
    pub count: usize,
    pub total_score: f64,
    pub average_score: f64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct StudentLevel {
    pub section_id: Uuid,
    pub section_display_name: String,
    pub level: Option<EvaluationLevel>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct StudentSummary {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub course: Option<String>,
    pub parallel: Option<String>,
    pub evaluations_count: usize,
    pub average_score: f64,
    pub levels: Vec<StudentLevel>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ParallelStudent {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub evaluations_count: usize,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ParallelGroup {
    pub parallel: String,
    pub students: Vec<ParallelStudent>,
    pub evaluations_count: usize,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct GroupOverview {
    pub total_students: usize,
    pub students_with_evaluations: usize,
    pub evaluations: usize,
    pub by_section: Vec<SectionScore>,
    pub levels_distribution: LevelsDistribution,
}

#[derive(Debug, Serialize)]
pub struct CareerReport {
    pub career: String,
    #[serde(flatten)]
    pub overview: GroupOverview,
    pub students: Vec<StudentSummary>,
}

#[derive(Debug, Serialize)]
pub struct CourseReport {
    pub career: String,
    pub course: String,
    #[serde(flatten)]
    pub overview: GroupOverview,
    pub by_parallel: Vec<ParallelGroup>,
}

fn evaluations_of<'a>(
    user_id: Uuid,
    evaluations: &'a [EvaluationListRow],
) -> Vec<&'a EvaluationListRow> {
    evaluations
        .iter()
        .filter(|e| e.evaluation.user_id == user_id)
        .collect()
}

/// Per-section count, total and average (two decimals), by display name.
pub fn group_by_section(evaluations: &[EvaluationListRow]) -> Vec<SectionScore> {
    let mut grouped: BTreeMap<Uuid, SectionScore> = BTreeMap::new();
    for e in evaluations {
        let entry = grouped.entry(e.evaluation.section_id).or_insert_with(|| SectionScore {
            section_id: e.evaluation.section_id,
            section_display_name: e.section_display_name.clone(),
            count: 0,
            total_score: 0.0,
            average_score: 0.0,
        });
        entry.count += 1;
        entry.total_score += e.evaluation.total_score.unwrap_or(0.0);
    }

    let mut sections: Vec<SectionScore> = grouped
        .into_values()
        .map(|mut s| {
            s.average_score = round2(s.total_score / s.count as f64);
            s
        })
        .collect();
    sections.sort_by(|a, b| a.section_display_name.cmp(&b.section_display_name));
    sections
}

/// Students grouped by parallel; students without one fall under `Sin paralelo`.
pub fn group_by_parallel(
    students: &[DbUser],
    evaluations: &[EvaluationListRow],
) -> Vec<ParallelGroup> {
    let mut groups: BTreeMap<String, ParallelGroup> = BTreeMap::new();
    for student in students {
        let parallel = student
            .parallel
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(NO_PARALLEL)
            .to_string();
        let count = evaluations_of(student.id, evaluations).len();
        let group = groups.entry(parallel.clone()).or_insert_with(|| ParallelGroup {
            parallel,
            students: Vec::new(),
            evaluations_count: 0,
        });
        group.students.push(ParallelStudent {
            id: student.id,
            email: student.email.clone(),
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
            evaluations_count: count,
        });
        group.evaluations_count += count;
    }
    groups.into_values().collect()
}

pub fn student_summaries(
    students: &[DbUser],
    evaluations: &[EvaluationListRow],
) -> Vec<StudentSummary> {
    students
        .iter()
        .map(|student| {
            let own = evaluations_of(student.id, evaluations);
            StudentSummary {
                id: student.id,
                email: student.email.clone(),
                first_name: student.first_name.clone(),
                last_name: student.last_name.clone(),
                course: student.course.clone(),
                parallel: student.parallel.clone(),
                evaluations_count: own.len(),
                average_score: average_score(&own),
                levels: own
                    .iter()
                    .map(|e| StudentLevel {
                        section_id: e.evaluation.section_id,
                        section_display_name: e.section_display_name.clone(),
                        level: e.evaluation.level,
                    })
                    .collect(),
            }
        })
        .collect()
}

pub fn group_overview(students: &[DbUser], evaluations: &[EvaluationListRow]) -> GroupOverview {
    let with_evaluations: HashSet<Uuid> =
        evaluations.iter().map(|e| e.evaluation.user_id).collect();
    GroupOverview {
        total_students: students.len(),
        students_with_evaluations: with_evaluations.len(),
        evaluations: evaluations.len(),
        by_section: group_by_section(evaluations),
        levels_distribution: distribution_of(evaluations),
    }
}

async fn cohort(
    pool: &PgPool,
    career: &str,
    course: Option<&str>,
    section_id: Option<Uuid>,
) -> AppResult<(Vec<DbUser>, Vec<EvaluationListRow>)> {
    let students = db::get_active_students(pool, Some(career), course).await?;
    let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
    let evaluations = if ids.is_empty() {
        Vec::new()
    } else {
        store::list_completed_for_users(pool, &ids, section_id).await?
    };
    Ok((students, evaluations))
}

pub async fn by_career(
    pool: &PgPool,
    career: &str,
    section_id: Option<Uuid>,
) -> AppResult<CareerReport> {
    let (students, evaluations) = cohort(pool, career, None, section_id).await?;
    Ok(CareerReport {
        career: career.to_string(),
        overview: group_overview(&students, &evaluations),
        students: student_summaries(&students, &evaluations),
    })
}

pub async fn by_course(
    pool: &PgPool,
    career: &str,
    course: &str,
    section_id: Option<Uuid>,
) -> AppResult<CourseReport> {
    let (students, evaluations) = cohort(pool, career, Some(course), section_id).await?;
    Ok(CourseReport {
        career: career.to_string(),
        course: course.to_string(),
        overview: group_overview(&students, &evaluations),
        by_parallel: group_by_parallel(&students, &evaluations),
    })
}

// ============================================
// Panels
// ============================================

#[derive(Debug, Serialize)]
pub struct SectionCard {
    pub id: Uuid,
    pub name: SectionName,
    pub display_name: String,
}

impl From<&SectionRow> for SectionCard {
    fn from(section: &SectionRow) -> Self {
        SectionCard {
            id: section.id,
            name: section.name,
            display_name: section.display_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SectionProgress {
    pub section: SectionCard,
    pub total_students: i64,
    pub completed: i64,
    pub in_progress: i64,
    pub pending: i64,
    pub completion_rate: f64,
    pub levels_distribution: LevelsDistribution,
}

#[derive(Debug, Serialize)]
pub struct SectionLevels {
    pub section: SectionCard,
    pub total: usize,
    pub distribution: LevelsDistribution,
}

/// Completed evaluations as a share of active students, two decimals.
pub fn completion_rate(completed: i64, total_students: i64) -> f64 {
    if total_students > 0 {
        round2(completed as f64 / total_students as f64 * 100.0)
    } else {
        0.0
    }
}

/// One section when `section_id` is given (empty if it does not exist),
/// otherwise every active section.
pub async fn progress(pool: &PgPool, section_id: Option<Uuid>) -> AppResult<Vec<SectionProgress>> {
    let sections: Vec<SectionRow> = match section_id {
        Some(id) => catalog::find_section(pool, id).await?.into_iter().collect(),
        None => catalog::list_sections(pool, true).await?,
    };
    let total_students = db::count_active_students(pool).await?;

    let mut panel = Vec::with_capacity(sections.len());
    for section in &sections {
        let counts = aggregates::status_counts_for_section(pool, section.id).await?;
        let levels = aggregates::completed_levels_for_section(pool, section.id).await?;
        panel.push(SectionProgress {
            section: SectionCard::from(section),
            total_students,
            completed: counts.completed,
            in_progress: counts.in_progress,
            pending: counts.pending,
            completion_rate: completion_rate(counts.completed, total_students),
            levels_distribution: levels.into_iter().collect(),
        });
    }
    Ok(panel)
}

pub async fn levels_by_section(pool: &PgPool) -> AppResult<Vec<SectionLevels>> {
    let sections = catalog::list_sections(pool, true).await?;
    let mut distribution = Vec::with_capacity(sections.len());
    for section in &sections {
        let levels = aggregates::completed_levels_for_section(pool, section.id).await?;
        distribution.push(SectionLevels {
            section: SectionCard::from(section),
            total: levels.len(),
            distribution: levels.into_iter().collect(),
        });
    }
    Ok(distribution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::evaluations::EvaluationRow;
    use crate::domain::models::{EvaluationStatus, UserRole};
    use chrono::Utc;

    fn student(parallel: Option<&str>) -> DbUser {
        DbUser {
            id: Uuid::new_v4(),
            email: format!("{}@ug.edu.ec", Uuid::new_v4()),
            hash: String::new(),
            first_name: "Ana".into(),
            last_name: "Mora".into(),
            role: UserRole::Student,
            career: Some("Sistemas".into()),
            course: Some("8vo".into()),
            parallel: parallel.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn completed(
        user_id: Uuid,
        section_id: Uuid,
        total: f64,
        level: EvaluationLevel,
    ) -> EvaluationListRow {
        EvaluationListRow {
            evaluation: EvaluationRow {
                id: Uuid::new_v4(),
                user_id,
                section_id,
                questionnaire_id: Uuid::new_v4(),
                status: EvaluationStatus::Completed,
                total_score: Some(total),
                max_score: Some(20.0),
                level: Some(level),
                started_at: Some(Utc::now()),
                completed_at: Some(Utc::now()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            section_display_name: "Habilidades Blandas".into(),
            questionnaire_title: "Comunicación".into(),
        }
    }

    #[test]
    fn distribution_counts_each_level() {
        let distribution: LevelsDistribution = [
            EvaluationLevel::Alto,
            EvaluationLevel::Alto,
            EvaluationLevel::MuyBajo,
        ]
        .into_iter()
        .collect();
        assert_eq!(distribution.alto, 2);
        assert_eq!(distribution.muy_bajo, 1);
        assert_eq!(distribution.muy_alto, 0);
    }

    #[test]
    fn section_averages_round_to_two_decimals() {
        let section = Uuid::new_v4();
        let user = Uuid::new_v4();
        let evaluations = vec![
            completed(user, section, 10.0, EvaluationLevel::Intermedio),
            completed(user, section, 5.0, EvaluationLevel::Bajo),
            completed(user, section, 5.0, EvaluationLevel::Bajo),
        ];
        let sections = group_by_section(&evaluations);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].count, 3);
        assert_eq!(sections[0].total_score, 20.0);
        assert_eq!(sections[0].average_score, 6.67);
    }

    #[test]
    fn students_without_parallel_are_grouped_together() {
        let a = student(Some("A"));
        let b = student(None);
        let c = student(Some(""));
        let section = Uuid::new_v4();
        let evaluations = vec![
            completed(a.id, section, 12.0, EvaluationLevel::Alto),
            completed(b.id, section, 4.0, EvaluationLevel::MuyBajo),
        ];

        let groups = group_by_parallel(&[a, b, c], &evaluations);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].parallel, "A");
        assert_eq!(groups[0].evaluations_count, 1);
        assert_eq!(groups[1].parallel, NO_PARALLEL);
        assert_eq!(groups[1].students.len(), 2);
        assert_eq!(groups[1].evaluations_count, 1);
    }

    #[test]
    fn overview_counts_distinct_students_with_evaluations() {
        let a = student(Some("A"));
        let b = student(Some("B"));
        let evaluations = vec![
            completed(a.id, Uuid::new_v4(), 12.0, EvaluationLevel::Alto),
            completed(a.id, Uuid::new_v4(), 18.0, EvaluationLevel::MuyAlto),
        ];
        let overview = group_overview(&[a.clone(), b], &evaluations);
        assert_eq!(overview.total_students, 2);
        assert_eq!(overview.students_with_evaluations, 1);
        assert_eq!(overview.evaluations, 2);
        assert_eq!(overview.by_section.len(), 2);

        let summaries = student_summaries(&[a], &evaluations);
        assert_eq!(summaries[0].evaluations_count, 2);
        assert_eq!(summaries[0].average_score, 15.0);
        assert_eq!(summaries[0].levels.len(), 2);
    }

    #[test]
    fn individual_summary_of_nothing_is_zeroed() {
        let summary = individual_summary(&[]);
        assert_eq!(summary.total_evaluations, 0);
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.levels_distribution, LevelsDistribution::default());
    }

    #[test]
    fn completion_rate_guards_empty_cohorts() {
        assert_eq!(completion_rate(3, 0), 0.0);
        assert_eq!(completion_rate(1, 3), 33.33);
    }
}
