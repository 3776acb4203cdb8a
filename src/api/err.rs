/// Errors raised by the grade average tooling
#[derive(thiserror::Error, Debug)]
pub enum CustomError {
    /// file could not be read
    #[error("failed to read file: {0}")]
    FileReadError(#[from] std::io::Error),
    /// file is readable but unusable, e.g. an empty score sheet
    #[error("illegal file: {0}")]
    IllegalFileError(String),
    #[error("failed to parse csv: {0}")]
    CsvParseError(#[from] csv::Error),
    /// csv rows that parse but carry unexpected data
    #[error("csv data error: {0}")]
    CsvDataError(String),
    #[error("failed to parse or compile a regular expression: {0}")]
    RegexError(#[from] regex::Error),
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("failed to migrate the database: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("failed to serialize report: {0}")]
    JsonError(#[from] serde_json::Error),
    /// a score outside the configured grading scale
    #[error("score{position} = {score} is outside the grading scale [{min}, {max}]")]
    ScoreOutOfRange {
        position: usize,
        score: f64,
        min: f64,
        max: f64,
    },
    /// a stored average that is not the mean of its scores
    #[error("average {actual} does not match the mean of the scores ({expected})")]
    AverageMismatch { expected: f64, actual: f64 },
    #[error("invalid grading scale: {0}")]
    InvalidScale(String),
    /// record without a usable student/subject reference
    #[error("missing identity: {0}")]
    MissingIdentity(String),
    #[error("no average record with id {0}")]
    NotFound(i64),
    #[error("configuration error: {0}")]
    ConfigError(String),
}
