use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::api::average::{AverageRecord, Identity, Scores};

/// Keep student grade averages and report on them
#[derive(Parser, Debug)]
#[command(name = "grade-averages", version)]
pub struct Cli {
    /// SQLite database file, overrides GRADES_DB_PATH
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Grading scale as <min>-<max>, overrides GRADES_SCALE
    #[arg(long, global = true)]
    pub scale: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every average record
    List(ListArgs),
    /// Show a single average record
    Show(ShowArgs),
    /// Add a new average record
    Add(RecordArgs),
    /// Replace the identity and scores of a stored record
    Update(UpdateArgs),
    /// Delete a stored record
    Delete { id: i64 },
    /// Import a csv score sheet
    Import { csv: PathBuf },
    /// Report records whose stored average does not match their scores
    Verify,
    /// Register a student
    AddStudent { name: String },
    /// Register a subject
    AddSubject { name: String },
    /// List registered students
    Students,
    /// List registered subjects
    Subjects,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show student and subject names instead of ids
    #[arg(long)]
    pub names: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: i64,

    #[arg(long)]
    pub names: bool,

    #[arg(long)]
    pub json: bool,
}

/// Either ids or names identify the student and subject
#[derive(Args, Debug)]
pub struct RecordArgs {
    #[arg(long, requires = "subject_id", conflicts_with_all = ["student", "subject"])]
    pub student_id: Option<i64>,

    #[arg(long, requires = "student_id")]
    pub subject_id: Option<i64>,

    /// Student name, registered on the fly when unknown
    #[arg(long, requires = "subject", required_unless_present = "student_id")]
    pub student: Option<String>,

    /// Subject name, registered on the fly when unknown
    #[arg(long, requires = "student", conflicts_with = "subject_id")]
    pub subject: Option<String>,

    /// The three scores
    #[arg(long, num_args = 3, value_names = ["SCORE1", "SCORE2", "SCORE3"], required = true, allow_negative_numbers = true)]
    pub scores: Vec<f64>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: i64,

    #[command(flatten)]
    pub record: RecordArgs,
}

impl RecordArgs {
    fn identity(&self) -> Identity {
        match (self.student_id, self.subject_id) {
            (Some(student_id), Some(subject_id)) => Identity::Identified {
                student_id,
                subject_id,
            },
            _ => Identity::Named {
                student_name: self.student.clone().unwrap_or_default(),
                subject_name: self.subject.clone().unwrap_or_default(),
            },
        }
    }

    fn scores(&self) -> Scores {
        let score = |idx: usize| self.scores.get(idx).copied().unwrap_or_default();
        Scores::new(score(0), score(1), score(2))
    }

    /// unsaved record built from the flags
    pub fn to_record(&self, record_id: Option<i64>) -> AverageRecord {
        AverageRecord::new(record_id, self.identity(), self.scores())
    }
}
