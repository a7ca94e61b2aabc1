mod cli;
mod logging;
mod reporter;

use std::process;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, PreviewArgs, ProcessArgs};
use colored::*;
use dicom_organizer::config::{load_configuration, AppConfig};
use dicom_organizer::reader::DicomReader;
use dicom_organizer::{preview, scanner, RunEngine, RunStatus};
use dotenv::dotenv;
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Process(process_args)) => {
            if let Err(err) = run_process(config, &process_args) {
                error!("Error: {}", err);
                process::exit(1);
            }
        }
        Some(Commands::Preview(preview_args)) => {
            if let Err(err) = run_preview(config, &preview_args) {
                error!("Error: {}", err);
                process::exit(1);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_process(mut config: AppConfig, args: &ProcessArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let engine = RunEngine::new(config);
    let reporter = CliReporter::new();
    let summary = engine.run(&reporter)?;

    println!();
    let d = &summary.durations;
    info!(
        "Total: {} (Discovery: {}, Index: {}, Organize: {}, Export: {})",
        format!("{:.2}s", summary.total_duration().as_secs_f64()).green(),
        format!("{:.2}s", d.discovery_secs).green(),
        format!("{:.2}s", d.index_secs).green(),
        format!("{:.2}s", d.organize_secs).green(),
        format!("{:.2}s", d.export_secs).green(),
    );
    match summary.status {
        RunStatus::Completed => info!(
            "{} instances in {} tests, {} files placed, {} failed",
            format!("{}", summary.indexed_instances).cyan(),
            format!("{}", summary.tests_created).cyan(),
            format!("{}", summary.files_placed).cyan(),
            format!("{}", summary.files_failed).red(),
        ),
        RunStatus::NoRecords => warn!(
            "{} of {} files could be indexed",
            "none".red(),
            summary.total_files_seen,
        ),
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_preview(mut config: AppConfig, args: &PreviewArgs) -> anyhow::Result<()> {
    args.input.apply(&mut config);
    let discovery = scanner::discover(&config.input, &config.dicom_folder, &config.ignore_patterns)?;
    let report = preview::preview(&discovery.paths, args.sample, &DicomReader);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
