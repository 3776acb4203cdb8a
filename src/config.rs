use std::path::PathBuf;
use std::str::FromStr;

use simplelog::LevelFilter;

use crate::api::{err::CustomError, policy::GradingScale};

pub const DB_PATH_VAR: &str = "GRADES_DB_PATH";
pub const SCALE_VAR: &str = "GRADES_SCALE";
pub const LOG_LEVEL_VAR: &str = "GRADES_LOG_LEVEL";
pub const LOG_FILE_VAR: &str = "GRADES_LOG_FILE";

const DEFAULT_DB_PATH: &str = "grades.db";

/// Settings read from the environment (and `.env`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    /// raw scale text, parsed only by commands that validate scores
    pub scale: Option<String>,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, CustomError> {
        // a missing .env file is fine
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CustomError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = value(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let scale = value(SCALE_VAR);
        let log_level = match value(LOG_LEVEL_VAR) {
            Some(level) => LevelFilter::from_str(level.trim()).map_err(|_| {
                CustomError::ConfigError(format!("{} has unknown level '{}'", LOG_LEVEL_VAR, level))
            })?,
            None => LevelFilter::Info,
        };
        let log_file = value(LOG_FILE_VAR).map(PathBuf::from);

        Ok(Self {
            db_path,
            scale,
            log_level,
            log_file,
        })
    }

    /// command line flags win over the environment
    pub fn apply_flags(&mut self, db_path: Option<PathBuf>, scale: Option<String>) {
        if let Some(db_path) = db_path {
            self.db_path = db_path;
        }
        if let Some(scale) = scale {
            self.scale = Some(scale);
        }
    }

    /// the parsed grading scale, or an error naming where to set it
    pub fn require_scale(&self) -> Result<GradingScale, CustomError> {
        match &self.scale {
            Some(text) => GradingScale::parse(text),
            None => Err(CustomError::ConfigError(format!(
                "no grading scale configured, set {} or pass --scale (e.g. 0-5)",
                SCALE_VAR
            ))),
        }
    }
}
