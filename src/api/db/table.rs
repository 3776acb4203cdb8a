use log::warn;
use serde::Serialize;

use crate::api::average::{AverageRecord, Scores};
use crate::api::policy::check_average;

/// student reference row
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: i64,
    pub name: String,
}

/// subject reference row
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub subject_id: i64,
    pub name: String,
}

/// averages row as stored, with raw foreign keys
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct AverageRow {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub score1: f64,
    pub score2: f64,
    pub score3: f64,
    pub average: f64,
}

/// averages row joined with the student and subject names
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct NamedAverageRow {
    pub id: i64,
    pub student_name: String,
    pub subject_name: String,
    pub score1: f64,
    pub score2: f64,
    pub score3: f64,
    pub average: f64,
}

impl AverageRow {
    pub fn scores(&self) -> Scores {
        Scores::new(self.score1, self.score2, self.score3)
    }
}

impl NamedAverageRow {
    pub fn scores(&self) -> Scores {
        Scores::new(self.score1, self.score2, self.score3)
    }
}

impl From<AverageRow> for AverageRecord {
    fn from(row: AverageRow) -> Self {
        let scores = row.scores();
        if let Err(e) = check_average(&scores, row.average) {
            warn!("average row {}: {}", row.id, e);
        }
        AverageRecord::by_ids(Some(row.id), row.student_id, row.subject_id, scores)
    }
}

impl From<NamedAverageRow> for AverageRecord {
    fn from(row: NamedAverageRow) -> Self {
        let scores = row.scores();
        if let Err(e) = check_average(&scores, row.average) {
            warn!("average row {}: {}", row.id, e);
        }
        AverageRecord::by_names(Some(row.id), row.student_name, row.subject_name, scores)
    }
}

/// A stored average that disagrees with its scores
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Inconsistency {
    pub record_id: i64,
    pub stored_average: f64,
    pub expected_average: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_record_recomputes_average() {
        let row = AverageRow {
            id: 4,
            student_id: 10,
            subject_id: 20,
            score1: 4.0,
            score2: 3.5,
            score3: 5.0,
            average: 1.0,
        };
        let record = AverageRecord::from(row);
        assert_eq!(record.record_id(), Some(4));
        assert_eq!(record.student_id(), 10);
        assert!((record.average() - 12.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_named_row_into_record() {
        let row = NamedAverageRow {
            id: 2,
            student_name: "Ana".to_string(),
            subject_name: "Math".to_string(),
            score1: 3.0,
            score2: 3.0,
            score3: 3.0,
            average: 3.0,
        };
        let record = AverageRecord::from(row);
        assert_eq!(record.student_name(), "Ana");
        assert_eq!(record.subject_name(), "Math");
        assert_eq!(record.student_id(), 0);
        assert_eq!(record.average(), 3.0);
    }
}
