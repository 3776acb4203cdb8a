use std::path::Path;

use average::AverageRecord;
use db::{AppState, ImportSummary, Inconsistency};
use err::CustomError;
use log::{info, warn};
use policy::GradingScale;

pub mod average;
pub mod csv_processor;
pub mod db;
pub mod err;
pub mod policy;
pub mod report;

/// Which shape records are read back in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordView {
    /// raw student and subject ids
    Ids,
    /// joined student and subject names
    Names,
}

pub async fn list_averages(
    state: &AppState,
    view: RecordView,
) -> Result<Vec<AverageRecord>, CustomError> {
    match view {
        RecordView::Ids => state.list_averages().await,
        RecordView::Names => state.list_named_averages().await,
    }
}

pub async fn show_average(
    state: &AppState,
    record_id: i64,
    view: RecordView,
) -> Result<AverageRecord, CustomError> {
    match view {
        RecordView::Ids => state.get_average(record_id).await,
        RecordView::Names => state.get_named_average(record_id).await,
    }
}

/// validate against the grading scale, then store
pub async fn insert_average(
    state: &AppState,
    scale: &GradingScale,
    record: AverageRecord,
) -> Result<AverageRecord, CustomError> {
    scale.validate(&record)?;
    state.insert_average(&record).await
}

pub async fn update_average(
    state: &AppState,
    scale: &GradingScale,
    record: AverageRecord,
) -> Result<(), CustomError> {
    scale.validate(&record)?;
    state.update_average(&record).await
}

pub async fn delete_average(state: &AppState, record_id: i64) -> Result<(), CustomError> {
    state.delete_average(record_id).await
}

/// Import a csv score sheet.
///
/// Rows that break the grading policy are skipped and counted as rejected,
/// the rest are written in bulk.
pub async fn import_scores(
    state: &AppState,
    scale: &GradingScale,
    csv_path: &Path,
) -> Result<ImportSummary, CustomError> {
    let entries = csv_processor::read_score_sheet(csv_path)?;
    info!(
        "read {} score rows from {}",
        entries.len(),
        csv_path.display()
    );

    let mut accepted = Vec::with_capacity(entries.len());
    let mut rejected = 0;
    for (line, record) in entries {
        match scale.validate(&record) {
            Ok(()) => accepted.push(record),
            Err(e) => {
                warn!("{} line {}: {}", csv_path.display(), line, e);
                rejected += 1;
            }
        }
    }

    let summary = state.insert_many(accepted).await?;
    Ok(ImportSummary {
        rejected,
        ..summary
    })
}

pub async fn verify_averages(state: &AppState) -> Result<Vec<Inconsistency>, CustomError> {
    let inconsistent = state.find_inconsistent().await?;
    for row in &inconsistent {
        warn!(
            "record {} stores average {} but its scores average {}",
            row.record_id, row.stored_average, row.expected_average
        );
    }
    Ok(inconsistent)
}
