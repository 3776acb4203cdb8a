use regex::Regex;

use super::average::{AverageRecord, Identity, Scores};
use super::err::CustomError;

/// Largest allowed gap between a stored average and the mean of its scores
pub const AVERAGE_TOLERANCE: f64 = 1e-9;

/// Inclusive range every score has to fall in.
///
/// No default scale exists, it is always read from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingScale {
    min: f64,
    max: f64,
}

impl GradingScale {
    pub fn new(min: f64, max: f64) -> Result<Self, CustomError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(CustomError::InvalidScale(format!(
                "bounds must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min >= max {
            return Err(CustomError::InvalidScale(format!(
                "lower bound {} is not below upper bound {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Parse `<min>-<max>` or `<min>..<max>`, e.g. `0-5` or `0.0..100`
    pub fn parse(text: &str) -> Result<Self, CustomError> {
        let re = Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:-|\.\.)\s*(\d+(?:\.\d+)?)\s*$")?;
        let captures = re
            .captures(text)
            .ok_or_else(|| CustomError::InvalidScale(format!("cannot parse '{}'", text)))?;
        let bound = |idx: usize| -> Result<f64, CustomError> {
            captures[idx]
                .parse::<f64>()
                .map_err(|e| CustomError::InvalidScale(format!("{}: {}", &captures[idx], e)))
        };
        Self::new(bound(1)?, bound(2)?)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// NaN is never inside the scale
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }

    pub fn validate_scores(&self, scores: &Scores) -> Result<(), CustomError> {
        for (idx, score) in scores.iter().enumerate() {
            if !self.contains(score) {
                return Err(CustomError::ScoreOutOfRange {
                    position: idx + 1,
                    score,
                    min: self.min,
                    max: self.max,
                });
            }
        }
        Ok(())
    }

    pub fn validate_identity(&self, identity: &Identity) -> Result<(), CustomError> {
        match identity {
            Identity::Identified {
                student_id,
                subject_id,
            } => {
                if *student_id <= 0 {
                    return Err(CustomError::MissingIdentity(format!(
                        "student id must be positive, got {}",
                        student_id
                    )));
                }
                if *subject_id <= 0 {
                    return Err(CustomError::MissingIdentity(format!(
                        "subject id must be positive, got {}",
                        subject_id
                    )));
                }
            }
            Identity::Named {
                student_name,
                subject_name,
            } => {
                if student_name.trim().is_empty() {
                    return Err(CustomError::MissingIdentity(
                        "student name is empty".to_string(),
                    ));
                }
                if subject_name.trim().is_empty() {
                    return Err(CustomError::MissingIdentity(
                        "subject name is empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// check a record before it is persisted
    pub fn validate(&self, record: &AverageRecord) -> Result<(), CustomError> {
        self.validate_identity(record.identity())?;
        self.validate_scores(&record.scores())
    }
}

/// Compare a stored average against the mean of its scores
pub fn check_average(scores: &Scores, stored: f64) -> Result<(), CustomError> {
    let expected = scores.mean();
    // a NaN stored value fails the comparison too
    if (stored - expected).abs() <= AVERAGE_TOLERANCE {
        Ok(())
    } else {
        Err(CustomError::AverageMismatch {
            expected,
            actual: stored,
        })
    }
}
