use clap::Args;
use cthyb_core::{ErrorInfo, SolverError};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Emit package metadata as JSON.
    #[arg(long)]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    driver: &'static str,
}

pub fn run(args: &VersionArgs) -> Result<(), SolverError> {
    if !args.long {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let info = VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        driver: cthyb_driver::VERSION,
    };
    let json = serde_json::to_string_pretty(&info)
        .map_err(|err| SolverError::Serde(ErrorInfo::new("version-json", err.to_string())))?;
    println!("{json}");
    Ok(())
}
