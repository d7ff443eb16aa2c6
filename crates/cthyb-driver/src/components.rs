use std::ops::RangeInclusive;

use cthyb_core::{SolverError, C64};
use log::warn;
use ndarray::{s, Array5};
use serde::{Deserialize, Serialize};

use crate::compound::{component_count, index_to_component, ComponentSpec};
use crate::config::EngineConfiguration;

/// Operator count of the one-particle worm sector.
pub const TWO_OPERATORS: u32 = 2;
/// Operator count of the two-particle worm sectors.
pub const FOUR_OPERATORS: u32 = 4;

/// Sampling budget of an engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Budget {
    /// Number of measurement cycles.
    Cycles(u64),
    /// Wall-clock seconds.
    WallClock(f64),
}

impl Budget {
    /// Budget currently stored in the engine options; a positive
    /// `measurement_time` takes precedence over `Nmeas`.
    pub fn from_config(config: &EngineConfiguration) -> Self {
        let seconds = config.qmc_f64("measurement_time");
        if seconds > 0.0 {
            Budget::WallClock(seconds)
        } else {
            Budget::Cycles(config.qmc_int("Nmeas").max(0) as u64)
        }
    }

    /// Even share of the budget for each of `count` components.
    ///
    /// Cycle counts round down, wall-clock budgets are truncated to whole
    /// seconds. Returns `None` when there is nothing to share the budget with.
    pub fn apportion(&self, count: usize) -> Option<Self> {
        if count == 0 {
            return None;
        }
        Some(match *self {
            Budget::Cycles(cycles) => Budget::Cycles(cycles / count as u64),
            Budget::WallClock(seconds) => Budget::WallClock((seconds / count as f64).floor()),
        })
    }
}

/// Ordered list of components to sample and the budget of each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPlan {
    /// Number of operators per component.
    pub arity: u32,
    /// Compound indices in sampling order.
    pub components: Vec<u64>,
    /// Budget override per component; `None` keeps the configured budget.
    pub budget: Option<Budget>,
}

impl ComponentPlan {
    /// Number of engine invocations the plan requires.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is sampled.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Lazy range over every compound index for the given arity.
pub fn component_range(n_orb: usize, arity: u32) -> Result<RangeInclusive<u64>, SolverError> {
    Ok(1..=component_count(n_orb, arity)?)
}

/// Every compound index for the given arity, ascending.
pub fn full_range(n_orb: usize, arity: u32) -> Result<Vec<u64>, SolverError> {
    Ok(component_range(n_orb, arity)?.collect())
}

/// Resolves explicit selections in the order given; duplicates keep their first position.
pub fn explicit(
    n_orb: usize,
    arity: u32,
    specs: &[ComponentSpec],
) -> Result<Vec<u64>, SolverError> {
    let mut components = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec.resolve(n_orb, arity)? {
            Some(index) if !components.contains(&index) => components.push(index),
            Some(_) => {}
            None => warn!("skipping non-positive worm component {spec:?}"),
        }
    }
    Ok(components)
}

/// Explicit selections when given, otherwise the full range.
pub fn enumerate(
    n_orb: usize,
    arity: u32,
    specs: Option<&[ComponentSpec]>,
) -> Result<Vec<u64>, SolverError> {
    match specs {
        Some(specs) => explicit(n_orb, arity, specs),
        None => full_range(n_orb, arity),
    }
}

/// Two-operator components whose hybridization entry exceeds `threshold`
/// somewhere on the time grid.
///
/// A structurally zero hybridization entry is taken to imply a structurally
/// zero Green's function component.
pub fn nonzero_two_operator(
    n_orb: usize,
    ftau: &Array5<C64>,
    threshold: f64,
) -> Result<Vec<u64>, SolverError> {
    let mut retained = Vec::new();
    for index in component_range(n_orb, TWO_OPERATORS)? {
        let pairs = index_to_component(n_orb, TWO_OPERATORS, index)?;
        let (first, second) = (pairs[0], pairs[1]);
        let entry = ftau.slice(s![.., first.band, first.spin, second.band, second.spin]);
        if entry.iter().any(|value| value.norm() > threshold) {
            retained.push(index);
        }
    }
    Ok(retained)
}

/// Plan for the one-particle worm sector: optional pruning and an even
/// split of the configured budget.
pub fn plan_two_operator(
    n_orb: usize,
    ftau: &Array5<C64>,
    threshold: Option<f64>,
    config: &EngineConfiguration,
) -> Result<ComponentPlan, SolverError> {
    let components = match threshold {
        Some(threshold) => nonzero_two_operator(n_orb, ftau, threshold)?,
        None => full_range(n_orb, TWO_OPERATORS)?,
    };
    if components.is_empty() {
        warn!("no two-operator worm component has a non-zero hybridization");
    }
    let budget = Budget::from_config(config).apportion(components.len());
    Ok(ComponentPlan {
        arity: TWO_OPERATORS,
        components,
        budget,
    })
}

/// Plan for a four-operator sector; every component keeps the configured budget.
pub fn plan_four_operator(
    n_orb: usize,
    specs: Option<&[ComponentSpec]>,
) -> Result<ComponentPlan, SolverError> {
    Ok(ComponentPlan {
        arity: FOUR_OPERATORS,
        components: enumerate(n_orb, FOUR_OPERATORS, specs)?,
        budget: None,
    })
}

/// Parses the raw `WormComponents` option into selections.
pub fn specs_from_config(config: &EngineConfiguration) -> Result<Vec<ComponentSpec>, SolverError> {
    match config.get(crate::config::QMC, "WormComponents") {
        Some(crate::config::OptionValue::List(entries)) => {
            entries.iter().map(ComponentSpec::from_option).collect()
        }
        Some(single) => Ok(vec![ComponentSpec::from_option(single)?]),
        None => Ok(Vec::new()),
    }
}
