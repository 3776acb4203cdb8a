mod table;
use futures::future::join_all;
use log::{debug, error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::sync::Arc;
use table::{AverageRow, NamedAverageRow};
pub use table::{Inconsistency, Student, Subject};

use super::{
    average::{AverageRecord, Identity},
    err::CustomError,
    policy::check_average,
};

/// database file created inside the data directory
pub const DB_FILE_NAME: &str = "grades.db";
/// number of records written per task and transaction by a bulk insert
pub const IMPORT_CHUNK_SIZE: usize = 400;

const SELECT_AVERAGES: &str = r"SELECT id, student_id, subject_id, score1, score2, score3, average
    FROM averages";

const SELECT_NAMED_AVERAGES: &str = r"SELECT
        a.id,
        st.name AS student_name,
        su.name AS subject_name,
        a.score1,
        a.score2,
        a.score3,
        a.average
    FROM averages AS a
    JOIN students st ON st.student_id = a.student_id
    JOIN subjects su ON su.subject_id = a.subject_id";

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
}

/// Outcome of a bulk insert
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    /// rows refused before reaching the database
    pub rejected: usize,
    /// rows lost with a failed chunk
    pub failed: usize,
}

impl AppState {
    /// open (or create) the database inside `data_dir`
    pub async fn build(data_dir: &Path) -> Result<Self, CustomError> {
        // create the data directory if it doesn't exist
        std::fs::create_dir_all(data_dir)?;
        Self::connect(&data_dir.join(DB_FILE_NAME)).await
    }

    /// open (or create) the database file at `db_path`
    pub async fn connect(db_path: &Path) -> Result<Self, CustomError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        // use the migration feature of sqlx to create the tables
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database ready at {}", db_path.display());

        Ok(AppState { db: pool })
    }

    pub async fn insert_student(&self, name: &str) -> Result<i64, CustomError> {
        let mut tx = self.db.begin().await?;
        let student_id = upsert_student(&mut tx, name).await?;
        tx.commit().await?;
        Ok(student_id)
    }

    pub async fn insert_subject(&self, name: &str) -> Result<i64, CustomError> {
        let mut tx = self.db.begin().await?;
        let subject_id = upsert_subject(&mut tx, name).await?;
        tx.commit().await?;
        Ok(subject_id)
    }

    pub async fn list_students(&self) -> Result<Vec<Student>, CustomError> {
        let students = sqlx::query_as("SELECT student_id, name FROM students ORDER BY student_id")
            .fetch_all(&self.db)
            .await?;
        Ok(students)
    }

    pub async fn list_subjects(&self) -> Result<Vec<Subject>, CustomError> {
        let subjects = sqlx::query_as("SELECT subject_id, name FROM subjects ORDER BY subject_id")
            .fetch_all(&self.db)
            .await?;
        Ok(subjects)
    }

    /// insert a record and return it with the id the database assigned
    pub async fn insert_average(
        &self,
        record: &AverageRecord,
    ) -> Result<AverageRecord, CustomError> {
        let mut tx = self.db.begin().await?;
        let record_id = insert_average_row(&mut tx, record).await?;
        tx.commit().await?;
        info!("inserted average record {}", record_id);
        Ok(record.with_record_id(Some(record_id)))
    }

    pub async fn update_average(&self, record: &AverageRecord) -> Result<(), CustomError> {
        let record_id = record.record_id().ok_or_else(|| {
            CustomError::MissingIdentity("cannot update a record without an id".to_string())
        })?;

        let mut tx = self.db.begin().await?;
        let (student_id, subject_id) = resolve_identity(&mut tx, record.identity()).await?;
        let result = sqlx::query(
            r"UPDATE averages
                SET student_id = ?1, subject_id = ?2,
                    score1 = ?3, score2 = ?4, score3 = ?5, average = ?6
                WHERE id = ?7;",
        )
        .bind(student_id)
        .bind(subject_id)
        .bind(record.score1())
        .bind(record.score2())
        .bind(record.score3())
        .bind(record.average())
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // dropping the transaction rolls back the name upserts
            return Err(CustomError::NotFound(record_id));
        }
        tx.commit().await?;
        info!("updated average record {}", record_id);
        Ok(())
    }

    pub async fn delete_average(&self, record_id: i64) -> Result<(), CustomError> {
        let result = sqlx::query("DELETE FROM averages WHERE id = ?1")
            .bind(record_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CustomError::NotFound(record_id));
        }
        info!("deleted average record {}", record_id);
        Ok(())
    }

    pub async fn get_average(&self, record_id: i64) -> Result<AverageRecord, CustomError> {
        let row: Option<AverageRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_AVERAGES))
            .bind(record_id)
            .fetch_optional(&self.db)
            .await?;
        row.map(AverageRecord::from)
            .ok_or(CustomError::NotFound(record_id))
    }

    pub async fn get_named_average(&self, record_id: i64) -> Result<AverageRecord, CustomError> {
        let row: Option<NamedAverageRow> =
            sqlx::query_as(&format!("{} WHERE a.id = ?1", SELECT_NAMED_AVERAGES))
                .bind(record_id)
                .fetch_optional(&self.db)
                .await?;
        row.map(AverageRecord::from)
            .ok_or(CustomError::NotFound(record_id))
    }

    /// all records with raw student and subject ids
    pub async fn list_averages(&self) -> Result<Vec<AverageRecord>, CustomError> {
        let rows: Vec<AverageRow> = sqlx::query_as(&format!("{} ORDER BY id", SELECT_AVERAGES))
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(AverageRecord::from).collect())
    }

    /// all records joined with the student and subject names
    pub async fn list_named_averages(&self) -> Result<Vec<AverageRecord>, CustomError> {
        let rows: Vec<NamedAverageRow> =
            sqlx::query_as(&format!("{} ORDER BY a.id", SELECT_NAMED_AVERAGES))
                .fetch_all(&self.db)
                .await?;
        Ok(rows.into_iter().map(AverageRecord::from).collect())
    }

    /// rows whose stored average is not the mean of their scores
    pub async fn find_inconsistent(&self) -> Result<Vec<Inconsistency>, CustomError> {
        let rows: Vec<AverageRow> = sqlx::query_as(&format!("{} ORDER BY id", SELECT_AVERAGES))
            .fetch_all(&self.db)
            .await?;
        let inconsistent = rows
            .iter()
            .filter_map(|row| match check_average(&row.scores(), row.average) {
                Ok(()) => None,
                Err(_) => Some(Inconsistency {
                    record_id: row.id,
                    stored_average: row.average,
                    expected_average: row.scores().mean(),
                }),
            })
            .collect();
        Ok(inconsistent)
    }

    pub async fn insert_many(
        &self,
        records: Vec<AverageRecord>,
    ) -> Result<ImportSummary, CustomError> {
        self.insert_in_chunks(records, IMPORT_CHUNK_SIZE).await
    }

    /// one task and one transaction per chunk, a failing chunk is rolled back as a whole
    async fn insert_in_chunks(
        &self,
        records: Vec<AverageRecord>,
        chunk_size: usize,
    ) -> Result<ImportSummary, CustomError> {
        let chunk_size = chunk_size.max(1);
        let data = Arc::new(records);
        let data_cnt = data.len();
        let task_cnt = data_cnt.div_ceil(chunk_size);

        // create the task handles
        let mut task_handles = Vec::with_capacity(task_cnt);
        for i in 0..task_cnt {
            // calculate the start and end index
            let start = i * chunk_size;
            let end = ((i + 1) * chunk_size).min(data_cnt);
            // clone the data and the database
            let data_clone = Arc::clone(&data);
            let db_state = self.clone();
            let task = tokio::spawn(async move {
                let mut tx = db_state.db.begin().await?;
                for record in &data_clone[start..end] {
                    insert_average_row(&mut tx, record).await?;
                }
                tx.commit().await?;
                Ok::<usize, CustomError>(end - start)
            });
            task_handles.push((end - start, task));
        }

        let (sizes, tasks): (Vec<usize>, Vec<_>) = task_handles.into_iter().unzip();
        let results = join_all(tasks).await;

        let mut summary = ImportSummary::default();
        for (idx, (size, result)) in sizes.into_iter().zip(results).enumerate() {
            match result {
                Ok(Ok(inserted)) => summary.inserted += inserted,
                Ok(Err(e)) => {
                    error!("chunk {} rolled back: {}", idx, e);
                    summary.failed += size;
                }
                Err(e) => {
                    error!("chunk {} task failed: {}", idx, e);
                    summary.failed += size;
                }
            }
        }
        info!(
            "bulk insert done: {} inserted, {} failed",
            summary.inserted, summary.failed
        );

        Ok(summary)
    }
}

/// insert the student if missing and return its id
async fn upsert_student<'db_connect>(
    tx: &mut sqlx::Transaction<'db_connect, Sqlite>,
    name: &str,
) -> Result<i64, CustomError> {
    sqlx::query(r"INSERT OR IGNORE INTO students (name) VALUES (?1);")
        .bind(name)
        .execute(&mut **tx)
        .await?;
    let student_id = sqlx::query_scalar(r"SELECT student_id FROM students WHERE name = ?1")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(student_id)
}

/// insert the subject if missing and return its id
async fn upsert_subject<'db_connect>(
    tx: &mut sqlx::Transaction<'db_connect, Sqlite>,
    name: &str,
) -> Result<i64, CustomError> {
    sqlx::query(r"INSERT OR IGNORE INTO subjects (name) VALUES (?1);")
        .bind(name)
        .execute(&mut **tx)
        .await?;
    let subject_id = sqlx::query_scalar(r"SELECT subject_id FROM subjects WHERE name = ?1")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(subject_id)
}

/// map the record identity to (student_id, subject_id)
async fn resolve_identity<'db_connect>(
    tx: &mut sqlx::Transaction<'db_connect, Sqlite>,
    identity: &Identity,
) -> Result<(i64, i64), CustomError> {
    match identity {
        Identity::Identified {
            student_id,
            subject_id,
        } => Ok((*student_id, *subject_id)),
        Identity::Named {
            student_name,
            subject_name,
        } => {
            let student_id = upsert_student(tx, student_name).await?;
            let subject_id = upsert_subject(tx, subject_name).await?;
            Ok((student_id, subject_id))
        }
    }
}

/// insert one averages row, the database assigns the id
async fn insert_average_row<'db_connect>(
    tx: &mut sqlx::Transaction<'db_connect, Sqlite>,
    record: &AverageRecord,
) -> Result<i64, CustomError> {
    if let Some(record_id) = record.record_id() {
        debug!("ignoring caller supplied id {} on insert", record_id);
    }
    let (student_id, subject_id) = resolve_identity(tx, record.identity()).await?;
    let result = sqlx::query(
        r"INSERT INTO averages
            ( student_id, subject_id, score1, score2, score3, average )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(record.score1())
    .bind(record.score2())
    .bind(record.score3())
    .bind(record.average())
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    async fn build_app_state() -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        let state = AppState::build(dir.path()).await.unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn test_build_creates_database_file() {
        let (dir, _state) = build_app_state().await;
        assert!(dir.path().join(DB_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_connect_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("school.db");
        AppState::connect(&db_path).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_insert_student_is_idempotent() {
        let (_dir, state) = build_app_state().await;
        let first = state.insert_student("Ana").await.unwrap();
        let second = state.insert_student("Ana").await.unwrap();
        assert_eq!(first, second);

        let students = state.list_students().await.unwrap();
        assert_eq!(
            students,
            vec![Student {
                student_id: first,
                name: "Ana".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_insert_and_get_by_ids() {
        let (_dir, state) = build_app_state().await;
        let student_id = state.insert_student("Ana").await.unwrap();
        let subject_id = state.insert_subject("Math").await.unwrap();

        let record = AverageRecord::by_ids(None, student_id, subject_id, [4.0, 3.5, 5.0]);
        let inserted = state.insert_average(&record).await.unwrap();
        let record_id = inserted.record_id().unwrap();

        let fetched = state.get_average(record_id).await.unwrap();
        assert_eq!(fetched, inserted);
        assert_eq!(fetched.student_name(), "");
        assert!((fetched.average() - 12.5 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_insert_by_names_and_join() {
        let (_dir, state) = build_app_state().await;
        let record = AverageRecord::by_names(None, "Ana", "Math", [3.0, 3.0, 3.0]);
        let inserted = state.insert_average(&record).await.unwrap();

        let named = state.list_named_averages().await.unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].record_id(), inserted.record_id());
        assert_eq!(named[0].student_name(), "Ana");
        assert_eq!(named[0].subject_name(), "Math");
        assert_eq!(named[0].student_id(), 0);
        assert_eq!(named[0].average(), 3.0);

        // the same row read by ids carries the resolved foreign keys
        let by_ids = state.list_averages().await.unwrap();
        assert_eq!(by_ids.len(), 1);
        assert_eq!(by_ids[0].student_name(), "");
        assert!(by_ids[0].student_id() > 0);
        assert!(by_ids[0].subject_id() > 0);

        let single = state
            .get_named_average(inserted.record_id().unwrap())
            .await
            .unwrap();
        assert_eq!(single, named[0]);
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_student() {
        let (_dir, state) = build_app_state().await;
        let record = AverageRecord::by_ids(None, 42, 42, [1.0, 1.0, 1.0]);
        let result = state.insert_average(&record).await;
        assert!(matches!(result, Err(CustomError::DbError(_))));
    }

    #[tokio::test]
    async fn test_update_average() {
        let (_dir, state) = build_app_state().await;
        let inserted = state
            .insert_average(&AverageRecord::by_names(None, "Ana", "Math", [1.0, 2.0, 3.0]))
            .await
            .unwrap();

        let changed = inserted.with_score3(6.0);
        state.update_average(&changed).await.unwrap();

        let fetched = state
            .get_named_average(inserted.record_id().unwrap())
            .await
            .unwrap();
        assert_eq!(fetched.score3(), 6.0);
        assert!((fetched.average() - 3.0).abs() < 1e-9);
        assert!(state.find_inconsistent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let (_dir, state) = build_app_state().await;
        let record = AverageRecord::by_names(Some(99), "Ana", "Math", [1.0, 2.0, 3.0]);
        let result = state.update_average(&record).await;
        assert!(matches!(result, Err(CustomError::NotFound(99))));
        // the rolled back transaction left no student behind
        assert!(state.list_students().await.unwrap().is_empty());

        let unsaved = record.with_record_id(None);
        let result = state.update_average(&unsaved).await;
        assert!(matches!(result, Err(CustomError::MissingIdentity(_))));
    }

    #[tokio::test]
    async fn test_delete_average() {
        let (_dir, state) = build_app_state().await;
        let inserted = state
            .insert_average(&AverageRecord::by_names(None, "Ana", "Math", [1.0, 2.0, 3.0]))
            .await
            .unwrap();
        let record_id = inserted.record_id().unwrap();

        state.delete_average(record_id).await.unwrap();
        assert!(matches!(
            state.get_average(record_id).await,
            Err(CustomError::NotFound(_))
        ));
        assert!(matches!(
            state.delete_average(record_id).await,
            Err(CustomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_in_chunks() {
        let (_dir, state) = build_app_state().await;
        let records = vec![
            AverageRecord::by_names(None, "Ana", "Math", [1.0, 2.0, 3.0]),
            AverageRecord::by_names(None, "Luis", "Math", [2.0, 2.0, 2.0]),
            AverageRecord::by_names(None, "Ana", "History", [4.0, 4.0, 4.0]),
            AverageRecord::by_names(None, "Marta", "Art", [5.0, 4.0, 3.0]),
            AverageRecord::by_names(None, "Luis", "Art", [0.0, 1.0, 2.0]),
        ];

        let summary = state.insert_in_chunks(records, 2).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                inserted: 5,
                rejected: 0,
                failed: 0
            }
        );
        assert_eq!(state.list_named_averages().await.unwrap().len(), 5);
        assert_eq!(state.list_students().await.unwrap().len(), 3);
        assert_eq!(state.list_subjects().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_rolled_back() {
        let (_dir, state) = build_app_state().await;
        let records = vec![
            AverageRecord::by_names(None, "Ana", "Math", [1.0, 2.0, 3.0]),
            AverageRecord::by_names(None, "Luis", "Math", [2.0, 2.0, 2.0]),
            // unknown foreign keys break the second chunk
            AverageRecord::by_ids(None, 999, 999, [4.0, 4.0, 4.0]),
            AverageRecord::by_names(None, "Marta", "Art", [5.0, 4.0, 3.0]),
        ];

        let summary = state.insert_in_chunks(records, 2).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 2);
        let names: Vec<String> = state
            .list_named_averages()
            .await
            .unwrap()
            .iter()
            .map(|r| r.student_name().to_string())
            .collect();
        assert_eq!(names, vec!["Ana", "Luis"]);
    }

    #[tokio::test]
    async fn test_insert_many_empty() {
        let (_dir, state) = build_app_state().await;
        let summary = state.insert_many(Vec::new()).await.unwrap();
        assert_eq!(summary, ImportSummary::default());
    }

    #[tokio::test]
    async fn test_find_inconsistent() {
        let (_dir, state) = build_app_state().await;
        let good = state
            .insert_average(&AverageRecord::by_names(None, "Ana", "Math", [1.0, 2.0, 3.0]))
            .await
            .unwrap();
        let student_id = state.insert_student("Luis").await.unwrap();
        let subject_id = state.insert_subject("Math").await.unwrap();

        // a row written by something that trusted a caller supplied average
        let bad_id = sqlx::query(
            r"INSERT INTO averages
                ( student_id, subject_id, score1, score2, score3, average )
                VALUES (?1, ?2, 4.0, 4.0, 4.0, 3.0);",
        )
        .bind(student_id)
        .bind(subject_id)
        .execute(&state.db)
        .await
        .unwrap()
        .last_insert_rowid();

        let inconsistent = state.find_inconsistent().await.unwrap();
        assert_eq!(
            inconsistent,
            vec![Inconsistency {
                record_id: bad_id,
                stored_average: 3.0,
                expected_average: 4.0,
            }]
        );
        assert_ne!(Some(bad_id), good.record_id());

        // reads always hand out the derived average
        let fetched = state.get_average(bad_id).await.unwrap();
        assert_eq!(fetched.average(), 4.0);
    }
}
