//! FlowRunner CLI Entry Point
//!
//! Runs one job document and writes its execution output.
//!
//! # Usage
//!
//! ```bash
//! # Run a job and print the output
//! flowrunner job.json
//!
//! # Write the output to a file
//! flowrunner job.yaml --output result.json
//!
//! # Override the storage service and artifacts directory
//! flowrunner job.json --storage-url http://store:3000 --artifacts-dir ./code
//! ```
//!
//! Exit codes: `0` succeeded, `1` a step failed, `2` the job could not be
//! loaded or configured.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::info;

use flowrunner::config::RunnerConfig;
use flowrunner::execution::{load_job, FlowRunner};
use flowrunner::{ExecutionOutput, APP_NAME, VERSION};

/// Exit code for runs that could not start.
const EXIT_SETUP_ERROR: u8 = 2;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "flowrunner", version, about = "Runs a flow job document")]
struct Cli {
    /// Job document (JSON, or YAML by extension)
    job: String,

    /// Write the execution output to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Base URL of the storage service
    #[arg(long)]
    storage_url: Option<String>,

    /// Directory code artifacts are resolved in
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    eprintln!();
    eprintln!("{} v{}", APP_NAME.bold(), VERSION);
    eprintln!("Flow Execution Engine");
    eprintln!();
}

/// Prints a one-line summary of the run.
fn print_summary(output: &ExecutionOutput) {
    match &output.error {
        None => eprintln!(
            "{} {} steps in {}ms",
            "SUCCEEDED".green().bold(),
            output.execution_state.len(),
            output.duration_ms
        ),
        Some(e) => eprintln!(
            "{} at '{}': {}",
            "FAILED".red().bold(),
            e.step_name.yellow(),
            e.message
        ),
    }
}

/// Writes the output document to `path`, or stdout when unset.
fn write_output(output: &ExecutionOutput, path: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = serde_json::to_string_pretty(output)?;
    match path {
        Some(path) => {
            fs::write(path, rendered)?;
            info!("Execution output written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Loads the job, runs it and reports the result.
async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = RunnerConfig::from_env()?;
    if let Some(url) = cli.storage_url {
        config.storage_url = url;
    }
    if let Some(dir) = cli.artifacts_dir {
        config.artifacts_dir = dir;
    }

    let job = match load_job(&cli.job) {
        Ok(job) => job,
        Err(output) => {
            write_output(&output, cli.output.as_ref())?;
            print_summary(&output);
            return Ok(ExitCode::from(EXIT_SETUP_ERROR));
        }
    };

    info!("Artifacts directory: {}", config.artifacts_dir.display());
    info!("Storage service: {}", config.storage_url);

    let runner = FlowRunner::new(config.executors(job.worker_token.clone())?);
    let output = runner.run(&job).await;

    write_output(&output, cli.output.as_ref())?;
    print_summary(&output);

    Ok(if output.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    print_banner();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}
