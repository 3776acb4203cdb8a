use std::fs::OpenOptions;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use simplelog::{
    ColorChoice, CombinedLogger, Config as LogConfig, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use grade_averages::api::{
    self, average::AverageRecord, db::AppState, err::CustomError, report, RecordView,
};
use grade_averages::cli::{Cli, Commands};
use grade_averages::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// terminal logging always, plus a log file when one is configured
fn init_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        config.log_level,
        LogConfig::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        loggers.push(WriteLogger::new(config.log_level, LogConfig::default(), file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

async fn run(args: Cli, mut config: Config) -> Result<(), CustomError> {
    config.apply_flags(args.db, args.scale);

    let state = AppState::connect(&config.db_path).await?;

    match args.command {
        Commands::List(list) => {
            let records = api::list_averages(&state, view(list.names)).await?;
            print_records(&records, list.json)?;
        }
        Commands::Show(show) => {
            let record = api::show_average(&state, show.id, view(show.names)).await?;
            print_records(&[record], show.json)?;
        }
        Commands::Add(record) => {
            let scale = config.require_scale()?;
            let saved = api::insert_average(&state, &scale, record.to_record(None)).await?;
            info!("saved as record {}", saved.record_id().unwrap_or_default());
            print!("{}", report::render_table(&[saved]));
        }
        Commands::Update(update) => {
            let record = update.record.to_record(Some(update.id));
            api::update_average(&state, &config.require_scale()?, record).await?;
        }
        Commands::Delete { id } => api::delete_average(&state, id).await?,
        Commands::Import { csv } => {
            let summary = api::import_scores(&state, &config.require_scale()?, &csv).await?;
            println!(
                "inserted {}, rejected {}, failed {}",
                summary.inserted, summary.rejected, summary.failed
            );
        }
        Commands::Verify => {
            let inconsistent = api::verify_averages(&state).await?;
            if inconsistent.is_empty() {
                println!("all stored averages match their scores");
            } else {
                println!("{}", serde_json::to_string_pretty(&inconsistent)?);
            }
        }
        Commands::AddStudent { name } => {
            let student_id = state.insert_student(&name).await?;
            println!("student {} has id {}", name, student_id);
        }
        Commands::AddSubject { name } => {
            let subject_id = state.insert_subject(&name).await?;
            println!("subject {} has id {}", name, subject_id);
        }
        Commands::Students => {
            println!("{}", serde_json::to_string_pretty(&state.list_students().await?)?);
        }
        Commands::Subjects => {
            println!("{}", serde_json::to_string_pretty(&state.list_subjects().await?)?);
        }
    }

    Ok(())
}

fn view(names: bool) -> RecordView {
    if names {
        RecordView::Names
    } else {
        RecordView::Ids
    }
}

fn print_records(records: &[AverageRecord], json: bool) -> Result<(), CustomError> {
    if json {
        println!("{}", report::to_json(records)?);
    } else {
        print!("{}", report::render_table(records));
    }
    Ok(())
}
