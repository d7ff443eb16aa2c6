use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use cthyb_core::{ErrorInfo, SolverError};
use cthyb_driver::{DispatchPlan, ImpurityProblem, SolveParams, Solver, SolverSetup};
use log::info;
use serde::{Deserialize, Serialize};

use crate::input_error;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// YAML file holding the solve parameters.
    #[arg(long)]
    pub params: PathBuf,
    /// JSON file holding the solver setup and the impurity problem.
    #[arg(long)]
    pub problem: PathBuf,
    /// Rank whose seed is reported.
    #[arg(long, default_value_t = 0)]
    pub rank: usize,
    /// Write the plan here instead of standard output.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Setup and problem bundled in a single input document.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemFile {
    pub setup: SolverSetup,
    pub problem: ImpurityProblem,
}

pub fn run(args: &PlanArgs) -> Result<(), SolverError> {
    let params = load_params(&args.params)?;
    let input = load_problem(&args.problem)?;
    let solver = Solver::new(input.setup);
    let plan = solver.plan(&input.problem, &params, args.rank)?;
    info!(
        "sector {} with {} engine invocation(s)",
        plan.sector,
        invocation_count(&plan)
    );

    let json = serde_json::to_string_pretty(&plan)
        .map_err(|err| SolverError::Serde(ErrorInfo::new("plan-json", err.to_string())))?;
    match &args.out {
        Some(path) => fs::write(path, json + "\n").map_err(|err| input_error(path, err)),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn invocation_count(plan: &DispatchPlan) -> usize {
    plan.components.as_ref().map_or(1, |components| components.len())
}

fn load_params(path: &Path) -> Result<SolveParams, SolverError> {
    let text = fs::read_to_string(path).map_err(|err| input_error(path, err))?;
    serde_yaml::from_str(&text).map_err(|err| input_error(path, err))
}

fn load_problem(path: &Path) -> Result<ProblemFile, SolverError> {
    let text = fs::read_to_string(path).map_err(|err| input_error(path, err))?;
    serde_json::from_str(&text).map_err(|err| input_error(path, err))
}
