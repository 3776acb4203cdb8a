use std::path::Path;

use serde::Deserialize;

use super::{
    average::{AverageRecord, Identity, Scores},
    err::CustomError,
};

// score sheet row, either ids or names identify the student and subject
#[derive(Deserialize, Debug)]
pub struct ScoreRow {
    // an empty cell is None, anything non numeric fails the row
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub subject_id: Option<i64>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
    pub score1: f64,
    pub score2: f64,
    pub score3: f64,
}

/// record built from one score sheet row, with the line it came from
pub type SheetEntry = (u64, AverageRecord);

impl ScoreRow {
    /// ids win when a row carries both ids and names
    fn identity(&self) -> Option<Identity> {
        if let (Some(student_id), Some(subject_id)) = (self.student_id, self.subject_id) {
            return Some(Identity::Identified {
                student_id,
                subject_id,
            });
        }
        match (non_blank(&self.student_name), non_blank(&self.subject_name)) {
            (Some(student_name), Some(subject_name)) => Some(Identity::Named {
                student_name: student_name.to_string(),
                subject_name: subject_name.to_string(),
            }),
            _ => None,
        }
    }

    pub fn into_record(self, line: u64) -> Result<AverageRecord, CustomError> {
        let identity = self.identity().ok_or_else(|| {
            CustomError::CsvDataError(format!(
                "line {}: needs student_id and subject_id or student_name and subject_name",
                line
            ))
        })?;
        Ok(AverageRecord::new(
            None,
            identity,
            Scores::new(self.score1, self.score2, self.score3),
        ))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Read a score sheet into unsaved records
pub fn read_score_sheet(csv_path: &Path) -> Result<Vec<SheetEntry>, CustomError> {
    let file = std::fs::File::open(csv_path)?;
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let headers = rdr.headers()?.clone();
    let mut entries = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |pos| pos.line());
        let row: ScoreRow = record.deserialize(Some(&headers))?;
        entries.push((line, row.into_record(line)?));
    }

    if entries.is_empty() {
        return Err(CustomError::IllegalFileError(format!(
            "{} has no score rows",
            csv_path.display()
        )));
    }
    Ok(entries)
}
