use crate::domain::scoring::{ScoringError, Totals};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "evaluation_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EvaluationLevel {
    MuyBajo,
    Bajo,
    Intermedio,
    Alto,
    MuyAlto,
}

impl EvaluationLevel {
    /// Classification order, lowest first.
    pub const ALL: [EvaluationLevel; 5] = [
        EvaluationLevel::MuyBajo,
        EvaluationLevel::Bajo,
        EvaluationLevel::Intermedio,
        EvaluationLevel::Alto,
        EvaluationLevel::MuyAlto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationLevel::MuyBajo => "muy_bajo",
            EvaluationLevel::Bajo => "bajo",
            EvaluationLevel::Intermedio => "intermedio",
            EvaluationLevel::Alto => "alto",
            EvaluationLevel::MuyAlto => "muy_alto",
        }
    }
}

/// Inclusive percentage band.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LevelRange {
    pub min: f64,
    pub max: f64,
}

impl LevelRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, percentage: f64) -> bool {
        self.min <= percentage && percentage <= self.max
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LevelRanges {
    pub muy_bajo: LevelRange,
    pub bajo: LevelRange,
    pub intermedio: LevelRange,
    pub alto: LevelRange,
    pub muy_alto: LevelRange,
}

/// Partial range set used by config updates; absent bands keep their stored value.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct LevelRangesPatch {
    pub muy_bajo: Option<LevelRange>,
    pub bajo: Option<LevelRange>,
    pub intermedio: Option<LevelRange>,
    pub alto: Option<LevelRange>,
    pub muy_alto: Option<LevelRange>,
}

impl LevelRangesPatch {
    pub fn is_empty(&self) -> bool {
        self.muy_bajo.is_none()
            && self.bajo.is_none()
            && self.intermedio.is_none()
            && self.alto.is_none()
            && self.muy_alto.is_none()
    }
}

impl LevelRanges {
    pub const DEFAULT: LevelRanges = LevelRanges {
        muy_bajo: LevelRange::new(0.0, 20.0),
        bajo: LevelRange::new(21.0, 40.0),
        intermedio: LevelRange::new(41.0, 60.0),
        alto: LevelRange::new(61.0, 80.0),
        muy_alto: LevelRange::new(81.0, 100.0),
    };

    pub fn get(&self, level: EvaluationLevel) -> LevelRange {
        match level {
            EvaluationLevel::MuyBajo => self.muy_bajo,
            EvaluationLevel::Bajo => self.bajo,
            EvaluationLevel::Intermedio => self.intermedio,
            EvaluationLevel::Alto => self.alto,
            EvaluationLevel::MuyAlto => self.muy_alto,
        }
    }

    pub fn merged(&self, patch: &LevelRangesPatch) -> LevelRanges {
        LevelRanges {
            muy_bajo: patch.muy_bajo.unwrap_or(self.muy_bajo),
            bajo: patch.bajo.unwrap_or(self.bajo),
            intermedio: patch.intermedio.unwrap_or(self.intermedio),
            alto: patch.alto.unwrap_or(self.alto),
            muy_alto: patch.muy_alto.unwrap_or(self.muy_alto),
        }
    }

    /// Write-time check: every band within [0, 100] with min <= max, and
    /// bands sorted by `min` strictly separated (`max` < next `min`).
    pub fn validate(&self) -> Result<(), ScoringError> {
        for level in EvaluationLevel::ALL {
            let range = self.get(level);
            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(ScoringError::InvalidRanges(format!(
                    "range {} must contain numbers",
                    level.as_str()
                )));
            }
            if range.min > range.max {
                return Err(ScoringError::InvalidRanges(format!(
                    "range {} has min greater than max",
                    level.as_str()
                )));
            }
            if range.min < 0.0 || range.max > 100.0 {
                return Err(ScoringError::InvalidRanges(format!(
                    "range {} must lie between 0 and 100",
                    level.as_str()
                )));
            }
        }

        let mut sorted: Vec<(EvaluationLevel, LevelRange)> = EvaluationLevel::ALL
            .iter()
            .map(|level| (*level, self.get(*level)))
            .collect();
        sorted.sort_by(|a, b| a.1.min.total_cmp(&b.1.min));

        for pair in sorted.windows(2) {
            let (lower_level, lower) = pair[0];
            let (upper_level, upper) = pair[1];
            if lower.max >= upper.min {
                return Err(ScoringError::InvalidRanges(format!(
                    "ranges {} and {} overlap",
                    lower_level.as_str(),
                    upper_level.as_str()
                )));
            }
        }
        Ok(())
    }

    /// First band containing `percentage`, testing lowest level first.
    /// Falls back to `MuyBajo` when the percentage lands in a gap.
    pub fn classify(&self, percentage: f64) -> EvaluationLevel {
        EvaluationLevel::ALL
            .into_iter()
            .find(|level| self.get(*level).contains(percentage))
            .unwrap_or(EvaluationLevel::MuyBajo)
    }

    pub fn classify_totals(&self, totals: &Totals) -> EvaluationLevel {
        self.classify(percentage(totals.total_score, totals.max_score))
    }
}

pub fn percentage(total_score: f64, max_score: f64) -> f64 {
    if max_score > 0.0 {
        total_score / max_score * 100.0
    } else {
        0.0
    }
}

/// Percentage rounded to two decimals, as shown in reports.
pub fn rounded_percentage(total_score: f64, max_score: f64) -> f64 {
    (percentage(total_score, max_score) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ranges_are_valid() {
        assert!(LevelRanges::DEFAULT.validate().is_ok());
    }

    #[test]
    fn high_percentage_is_muy_alto() {
        let totals = Totals {
            total_score: 12.5,
            max_score: 15.0,
        };
        let pct = percentage(totals.total_score, totals.max_score);
        assert!((pct - 83.333).abs() < 0.01);
        assert_eq!(
            LevelRanges::DEFAULT.classify_totals(&totals),
            EvaluationLevel::MuyAlto
        );
    }

    #[test]
    fn each_band_maps_to_its_label_inclusive() {
        let ranges = LevelRanges::DEFAULT;
        for level in EvaluationLevel::ALL {
            let band = ranges.get(level);
            assert_eq!(ranges.classify(band.min), level);
            assert_eq!(ranges.classify(band.max), level);
            assert_eq!(ranges.classify((band.min + band.max) / 2.0), level);
        }
    }

    #[test]
    fn gaps_fall_back_to_lowest_level() {
        let ranges = LevelRanges::DEFAULT;
        assert_eq!(ranges.classify(20.5), EvaluationLevel::MuyBajo);
        assert_eq!(ranges.classify(80.5), EvaluationLevel::MuyBajo);
    }

    #[test]
    fn zero_max_score_yields_zero_percentage() {
        assert_eq!(percentage(3.0, 0.0), 0.0);
        assert_eq!(
            LevelRanges::DEFAULT.classify_totals(&Totals {
                total_score: 0.0,
                max_score: 0.0
            }),
            EvaluationLevel::MuyBajo
        );
    }

    #[test]
    fn rejects_inverted_band() {
        let mut ranges = LevelRanges::DEFAULT;
        ranges.bajo = LevelRange::new(40.0, 21.0);
        assert!(matches!(
            ranges.validate(),
            Err(ScoringError::InvalidRanges(msg)) if msg.contains("bajo")
        ));
    }

    #[test]
    fn rejects_out_of_bounds_band() {
        let mut ranges = LevelRanges::DEFAULT;
        ranges.muy_alto = LevelRange::new(81.0, 101.0);
        assert!(ranges.validate().is_err());
        ranges.muy_alto = LevelRange::new(81.0, 100.0);
        ranges.muy_bajo = LevelRange::new(-1.0, 20.0);
        assert!(ranges.validate().is_err());
    }

    #[test]
    fn rejects_touching_or_overlapping_bands() {
        let mut ranges = LevelRanges::DEFAULT;
        ranges.bajo = LevelRange::new(20.0, 40.0);
        assert!(ranges.validate().is_err());

        let mut ranges = LevelRanges::DEFAULT;
        ranges.alto = LevelRange::new(55.0, 80.0);
        assert!(ranges.validate().is_err());
    }

    #[test]
    fn unordered_declaration_is_checked_after_sorting() {
        let ranges = LevelRanges {
            muy_bajo: LevelRange::new(81.0, 100.0),
            bajo: LevelRange::new(61.0, 80.0),
            intermedio: LevelRange::new(41.0, 60.0),
            alto: LevelRange::new(21.0, 40.0),
            muy_alto: LevelRange::new(0.0, 20.0),
        };
        assert!(ranges.validate().is_ok());
        assert_eq!(ranges.classify(90.0), EvaluationLevel::MuyBajo);
        assert_eq!(ranges.classify(10.0), EvaluationLevel::MuyAlto);
    }

    #[test]
    fn patch_replaces_only_given_bands() {
        let patch = LevelRangesPatch {
            alto: Some(LevelRange::new(61.0, 85.0)),
            muy_alto: Some(LevelRange::new(86.0, 100.0)),
            ..Default::default()
        };
        let merged = LevelRanges::DEFAULT.merged(&patch);
        assert_eq!(merged.muy_bajo, LevelRanges::DEFAULT.muy_bajo);
        assert_eq!(merged.alto, LevelRange::new(61.0, 85.0));
        assert!(merged.validate().is_ok());
        assert!(!patch.is_empty());
        assert!(LevelRangesPatch::default().is_empty());
    }

    #[test]
    fn report_percentage_rounds_to_two_decimals() {
        assert_eq!(rounded_percentage(12.5, 15.0), 83.33);
        assert_eq!(rounded_percentage(1.0, 0.0), 0.0);
    }
}
