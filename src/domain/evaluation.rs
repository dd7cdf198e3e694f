use crate::domain::levels::{EvaluationLevel, LevelRanges};
use crate::domain::models::EvaluationStatus;
use crate::domain::scoring::{aggregate, ScoredAnswer, ScoringError, Totals};

/// What a create request does given the evaluation already stored for the
/// same (user, section, questionnaire), if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDecision {
    Insert,
    ReuseExisting,
    Conflict,
}

pub fn decide_create(existing: Option<EvaluationStatus>) -> CreateDecision {
    match existing {
        None => CreateDecision::Insert,
        Some(EvaluationStatus::Completed) => CreateDecision::Conflict,
        Some(_) => CreateDecision::ReuseExisting,
    }
}

/// Starting or answering is only allowed before completion.
pub fn ensure_open(status: EvaluationStatus) -> Result<(), ScoringError> {
    if status.is_completed() {
        Err(ScoringError::AlreadyCompleted)
    } else {
        Ok(())
    }
}

/// Status after an answer lands: the first answer moves a pending evaluation forward.
pub fn status_after_answer(status: EvaluationStatus) -> Result<EvaluationStatus, ScoringError> {
    ensure_open(status)?;
    Ok(EvaluationStatus::InProgress)
}

/// What a complete request does with the stored evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStep {
    /// Already completed: the stored totals and level are returned untouched.
    ReturnFrozen,
    Compute,
}

pub fn completion_step(status: EvaluationStatus) -> CompletionStep {
    if status.is_completed() {
        CompletionStep::ReturnFrozen
    } else {
        CompletionStep::Compute
    }
}

/// Totals and level written once when an evaluation completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    pub totals: Totals,
    pub level: EvaluationLevel,
}

/// Aggregates the answers, then classifies against the section's active
/// ranges. An empty answer set is reported before a missing configuration.
pub fn compute_completion(
    answers: &[ScoredAnswer],
    ranges: Option<&LevelRanges>,
) -> Result<Completion, ScoringError> {
    let totals = aggregate(answers)?;
    let ranges = ranges.ok_or(ScoringError::MissingConfiguration)?;
    Ok(Completion {
        totals,
        level: ranges.classify_totals(&totals),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::levels::percentage;
    use crate::domain::scoring::{AnswerValue, ScaleSpec};

    fn answered(min: f64, max: f64, points: f64, value: f64) -> ScoredAnswer {
        let scale = ScaleSpec::new(min, max, points).unwrap();
        ScoredAnswer {
            score: Some(scale.score(&AnswerValue::Numeric(value))),
            points: scale.points(),
        }
    }

    #[test]
    fn create_inserts_when_nothing_exists() {
        assert_eq!(decide_create(None), CreateDecision::Insert);
    }

    #[test]
    fn create_reuses_unfinished_evaluation() {
        assert_eq!(
            decide_create(Some(EvaluationStatus::Pending)),
            CreateDecision::ReuseExisting
        );
        assert_eq!(
            decide_create(Some(EvaluationStatus::InProgress)),
            CreateDecision::ReuseExisting
        );
    }

    #[test]
    fn create_after_completion_conflicts() {
        assert_eq!(
            decide_create(Some(EvaluationStatus::Completed)),
            CreateDecision::Conflict
        );
    }

    #[test]
    fn answers_move_evaluation_forward_until_completed() {
        assert_eq!(
            status_after_answer(EvaluationStatus::Pending),
            Ok(EvaluationStatus::InProgress)
        );
        assert_eq!(
            status_after_answer(EvaluationStatus::InProgress),
            Ok(EvaluationStatus::InProgress)
        );
        assert_eq!(
            status_after_answer(EvaluationStatus::Completed),
            Err(ScoringError::AlreadyCompleted)
        );
    }

    #[test]
    fn completed_evaluations_are_returned_frozen() {
        assert_eq!(
            completion_step(EvaluationStatus::Completed),
            CompletionStep::ReturnFrozen
        );
        assert_eq!(completion_step(EvaluationStatus::Pending), CompletionStep::Compute);
        assert_eq!(
            completion_step(EvaluationStatus::InProgress),
            CompletionStep::Compute
        );
    }

    #[test]
    fn completion_totals_and_level_for_two_answers() {
        let answers = [answered(1.0, 10.0, 5.0, 5.5), answered(1.0, 10.0, 10.0, 10.0)];
        let completion = compute_completion(&answers, Some(&LevelRanges::DEFAULT)).unwrap();

        assert!((completion.totals.total_score - 12.5).abs() < 1e-9);
        assert!((completion.totals.max_score - 15.0).abs() < 1e-9);
        assert_eq!(completion.level, EvaluationLevel::MuyAlto);
    }

    #[test]
    fn completing_again_yields_the_same_result() {
        let answers = [answered(1.0, 5.0, 4.0, 3.0), answered(0.0, 10.0, 2.0, 11.0)];
        let first = compute_completion(&answers, Some(&LevelRanges::DEFAULT)).unwrap();
        let second = compute_completion(&answers, Some(&LevelRanges::DEFAULT)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.level, EvaluationLevel::Bajo);
    }

    #[test]
    fn completion_without_active_configuration_is_aborted() {
        let answers = [answered(1.0, 10.0, 5.0, 5.5)];
        assert_eq!(
            compute_completion(&answers, None),
            Err(ScoringError::MissingConfiguration)
        );
    }

    #[test]
    fn completion_without_answers_is_refused_first() {
        assert_eq!(
            compute_completion(&[], None),
            Err(ScoringError::NoAnswers)
        );
        assert_eq!(
            compute_completion(&[], Some(&LevelRanges::DEFAULT)),
            Err(ScoringError::NoAnswers)
        );
    }

    #[test]
    fn percentage_never_exceeds_full_marks() {
        let answers = [answered(1.0, 10.0, 2.0, 10.0), answered(1.0, 10.0, 3.0, 10.0)];
        let completion = compute_completion(&answers, Some(&LevelRanges::DEFAULT)).unwrap();
        let pct = percentage(completion.totals.total_score, completion.totals.max_score);
        assert!((pct - 100.0).abs() < 1e-9);
        assert_eq!(completion.level, EvaluationLevel::MuyAlto);
    }
}
