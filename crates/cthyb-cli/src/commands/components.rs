use clap::Args;
use cthyb_core::{ErrorInfo, SolverError};
use cthyb_driver::compound::{component_count, index_to_component};
use cthyb_driver::components::{component_range, FOUR_OPERATORS, TWO_OPERATORS};
use cthyb_driver::BandSpin;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ComponentsArgs {
    /// Number of orbitals.
    #[arg(long)]
    pub n_orb: usize,
    /// Operators per component (2 or 4).
    #[arg(long, default_value_t = FOUR_OPERATORS)]
    pub arity: u32,
    /// Compound indices to decode; every index when omitted.
    #[arg(long = "index", value_name = "INDEX")]
    pub indices: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct DecodedComponent {
    index: u64,
    operators: Vec<BandSpin>,
}

pub fn run(args: &ComponentsArgs) -> Result<(), SolverError> {
    if args.arity != TWO_OPERATORS && args.arity != FOUR_OPERATORS {
        return Err(SolverError::Configuration(
            ErrorInfo::new("arity", "components have two or four operators")
                .with_context("arity", args.arity.to_string()),
        ));
    }
    let total = component_count(args.n_orb, args.arity)?;
    let indices: Box<dyn Iterator<Item = u64>> = if args.indices.is_empty() {
        log::debug!("decoding all {total} components");
        Box::new(component_range(args.n_orb, args.arity)?)
    } else {
        log::debug!("decoding {} of {total} components", args.indices.len());
        Box::new(args.indices.iter().copied())
    };
    for index in indices {
        let decoded = DecodedComponent {
            index,
            operators: index_to_component(args.n_orb, args.arity, index)?,
        };
        let line = serde_json::to_string(&decoded)
            .map_err(|err| SolverError::Serde(ErrorInfo::new("component-json", err.to_string())))?;
        println!("{line}");
    }
    Ok(())
}
