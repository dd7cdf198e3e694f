//! Answer normalization and per-evaluation aggregation.
//!
//! Every question is a bounded numeric scale. A submitted value inside the
//! scale earns a linear share of the question's points; anything else earns
//! zero without being reported as a fault.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("invalid scale: {0}")]
    InvalidScale(String),
    #[error("invalid level ranges: {0}")]
    InvalidRanges(String),
    #[error("evaluation has no answers")]
    NoAnswers,
    #[error("evaluation is already completed")]
    AlreadyCompleted,
    #[error("no active evaluation configuration for the section")]
    MissingConfiguration,
}

/// Scale bounds and weight of one question. Construction enforces
/// `min_scale < max_scale`, so scoring never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleSpec {
    min_scale: f64,
    max_scale: f64,
    points: f64,
}

impl ScaleSpec {
    pub fn new(min_scale: f64, max_scale: f64, points: f64) -> Result<Self, ScoringError> {
        if !min_scale.is_finite() || !max_scale.is_finite() {
            return Err(ScoringError::InvalidScale(
                "scale bounds must be finite numbers".to_string(),
            ));
        }
        if min_scale >= max_scale {
            return Err(ScoringError::InvalidScale(format!(
                "min_scale ({min_scale}) must be lower than max_scale ({max_scale})"
            )));
        }
        if !points.is_finite() || points < 0.0 {
            return Err(ScoringError::InvalidScale(
                "points must be a non-negative number".to_string(),
            ));
        }
        Ok(Self {
            min_scale,
            max_scale,
            points,
        })
    }

    pub fn points(&self) -> f64 {
        self.points
    }

    pub fn score(&self, value: &AnswerValue) -> f64 {
        match value {
            AnswerValue::Numeric(v) if *v >= self.min_scale && *v <= self.max_scale => {
                (v - self.min_scale) / (self.max_scale - self.min_scale) * self.points
            }
            _ => 0.0,
        }
    }
}

/// A submitted answer, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Numeric(f64),
    Unparseable(String),
}

impl From<&Value> for AnswerValue {
    fn from(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => match n.as_f64() {
                Some(v) if v.is_finite() => AnswerValue::Numeric(v),
                _ => AnswerValue::Unparseable(n.to_string()),
            },
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => AnswerValue::Numeric(v),
                _ => AnswerValue::Unparseable(s.clone()),
            },
            other => AnswerValue::Unparseable(other.to_string()),
        }
    }
}

/// One stored answer joined with the points of the question it answers.
#[derive(Debug, Clone, Copy)]
pub struct ScoredAnswer {
    pub score: Option<f64>,
    pub points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub total_score: f64,
    pub max_score: f64,
}

/// Sums earned scores and attainable points over the answered questions only.
pub fn aggregate(answers: &[ScoredAnswer]) -> Result<Totals, ScoringError> {
    if answers.is_empty() {
        return Err(ScoringError::NoAnswers);
    }

    let totals = answers.iter().fold(
        Totals {
            total_score: 0.0,
            max_score: 0.0,
        },
        |acc, answer| Totals {
            total_score: acc.total_score + answer.score.unwrap_or(0.0),
            max_score: acc.max_score + answer.points,
        },
    );
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn midpoint_value_earns_proportional_points() {
        let scale = ScaleSpec::new(1.0, 10.0, 5.0).unwrap();
        assert!(approx(scale.score(&AnswerValue::Numeric(5.5)), 2.5));
    }

    #[test]
    fn scale_bounds_map_to_zero_and_full_points() {
        let scale = ScaleSpec::new(1.0, 5.0, 4.0).unwrap();
        assert!(approx(scale.score(&AnswerValue::Numeric(1.0)), 0.0));
        assert!(approx(scale.score(&AnswerValue::Numeric(5.0)), 4.0));
    }

    #[test]
    fn score_is_monotonic_inside_the_scale() {
        let scale = ScaleSpec::new(0.0, 7.0, 3.0).unwrap();
        let mut previous = -1.0;
        for step in 0..=70 {
            let value = step as f64 / 10.0;
            let score = scale.score(&AnswerValue::Numeric(value));
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn out_of_range_and_unparseable_values_score_zero() {
        let scale = ScaleSpec::new(1.0, 10.0, 5.0).unwrap();
        assert_eq!(scale.score(&AnswerValue::Numeric(0.5)), 0.0);
        assert_eq!(scale.score(&AnswerValue::Numeric(10.5)), 0.0);
        assert_eq!(
            scale.score(&AnswerValue::Unparseable("abc".to_string())),
            0.0
        );
    }

    #[test]
    fn degenerate_scales_are_rejected() {
        assert!(ScaleSpec::new(5.0, 5.0, 1.0).is_err());
        assert!(ScaleSpec::new(6.0, 5.0, 1.0).is_err());
        assert!(ScaleSpec::new(f64::NAN, 5.0, 1.0).is_err());
        assert!(ScaleSpec::new(1.0, 5.0, -1.0).is_err());
    }

    #[test]
    fn decodes_numbers_and_numeric_strings() {
        assert_eq!(AnswerValue::from(&json!(7)), AnswerValue::Numeric(7.0));
        assert_eq!(AnswerValue::from(&json!(" 5.5 ")), AnswerValue::Numeric(5.5));
        assert_eq!(
            AnswerValue::from(&json!("abc")),
            AnswerValue::Unparseable("abc".to_string())
        );
        assert_eq!(
            AnswerValue::from(&json!("NaN")),
            AnswerValue::Unparseable("NaN".to_string())
        );
        assert!(matches!(
            AnswerValue::from(&json!(true)),
            AnswerValue::Unparseable(_)
        ));
    }

    #[test]
    fn numeric_prefixes_are_not_coerced() {
        assert_eq!(
            AnswerValue::from(&json!("5 pts")),
            AnswerValue::Unparseable("5 pts".to_string())
        );
        let scale = ScaleSpec::new(1.0, 10.0, 5.0).unwrap();
        assert_eq!(scale.score(&AnswerValue::from(&json!("5 pts"))), 0.0);
    }

    #[test]
    fn aggregates_answered_questions() {
        let answers = [
            ScoredAnswer {
                score: Some(2.5),
                points: 5.0,
            },
            ScoredAnswer {
                score: Some(10.0),
                points: 10.0,
            },
        ];
        let totals = aggregate(&answers).unwrap();
        assert!(approx(totals.total_score, 12.5));
        assert!(approx(totals.max_score, 15.0));
    }

    #[test]
    fn aggregation_ignores_answer_order_and_missing_scores() {
        let mut answers = vec![
            ScoredAnswer {
                score: Some(1.0),
                points: 2.0,
            },
            ScoredAnswer {
                score: None,
                points: 3.0,
            },
            ScoredAnswer {
                score: Some(4.0),
                points: 4.0,
            },
        ];
        let forward = aggregate(&answers).unwrap();
        answers.reverse();
        let backward = aggregate(&answers).unwrap();
        assert_eq!(forward, backward);
        assert!(approx(forward.total_score, 5.0));
        assert!(approx(forward.max_score, 9.0));
    }

    #[test]
    fn empty_answer_set_is_refused() {
        assert_eq!(aggregate(&[]), Err(ScoringError::NoAnswers));
    }
}
