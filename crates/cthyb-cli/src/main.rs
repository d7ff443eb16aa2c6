use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    components::{self, ComponentsArgs},
    plan::{self, PlanArgs},
    version::{self, VersionArgs},
};
use cthyb_core::SolverError;
use log::error;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "cthyb", about = "CT-HYB solve orchestrator CLI")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate solve parameters and report the dispatch plan without sampling.
    Plan(PlanArgs),
    /// Decode or list compound component indices.
    Components(ComponentsArgs),
    /// Print the CLI version.
    Version(VersionArgs),
}

/// Exit status reserved for hard stops raised before the engine runs.
const FATAL_STATUS: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Plan(args) => plan::run(&args),
        Command::Components(args) => components::run(&args),
        Command::Version(args) => version::run(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            if err.is_fatal() {
                ExitCode::from(FATAL_STATUS)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Wraps an I/O or parse failure of an input file.
pub(crate) fn input_error(path: &std::path::Path, err: impl std::fmt::Display) -> SolverError {
    SolverError::Serde(
        cthyb_core::ErrorInfo::new("input", err.to_string())
            .with_context("path", path.display().to_string()),
    )
}
