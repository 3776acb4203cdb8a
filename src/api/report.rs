use serde::Serialize;

use super::{
    average::{AverageRecord, Identity},
    err::CustomError,
};

/// One line of an average report, shaped for JSON consumers
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject_name: Option<&'a str>,
    score1: f64,
    score2: f64,
    score3: f64,
    average: f64,
}

impl<'a> From<&'a AverageRecord> for ReportRow<'a> {
    fn from(record: &'a AverageRecord) -> Self {
        let named = is_named(record);
        Self {
            record_id: record.record_id(),
            student_id: (!named).then(|| record.student_id()),
            subject_id: (!named).then(|| record.subject_id()),
            student_name: named.then(|| record.student_name()),
            subject_name: named.then(|| record.subject_name()),
            score1: record.score1(),
            score2: record.score2(),
            score3: record.score3(),
            average: record.average(),
        }
    }
}

fn is_named(record: &AverageRecord) -> bool {
    matches!(record.identity(), Identity::Named { .. })
}

pub fn to_json(records: &[AverageRecord]) -> Result<String, CustomError> {
    let rows: Vec<ReportRow> = records.iter().map(ReportRow::from).collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Render records as a fixed width text table
pub fn render_table(records: &[AverageRecord]) -> String {
    let mut out = format!(
        "{:>6}  {:<20}  {:<20}  {:>7}  {:>7}  {:>7}  {:>7}\n",
        "id", "student", "subject", "score1", "score2", "score3", "average"
    );
    for record in records {
        let id = record
            .record_id()
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let (student, subject) = if is_named(record) {
            (
                record.student_name().to_string(),
                record.subject_name().to_string(),
            )
        } else {
            (record.student_id().to_string(), record.subject_id().to_string())
        };
        out.push_str(&format!(
            "{:>6}  {:<20}  {:<20}  {:>7.2}  {:>7.2}  {:>7.2}  {:>7.2}\n",
            id,
            student,
            subject,
            record.score1(),
            record.score2(),
            record.score3(),
            record.average()
        ));
    }
    out
}
