use std::collections::BTreeMap;

use cthyb_core::{ErrorInfo, SolverError, C64};
use ndarray::{Array4, Array5, ArrayD};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfiguration;

/// Impurity problem in the engine's flavour layout (spin fastest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineProblem {
    /// Inverse temperature.
    pub beta: f64,
    /// Number of orbitals.
    pub n_orb: usize,
    /// Hybridization as a hole propagator, shaped `(tau, o, s, o, s)`.
    pub ftau: Array5<C64>,
    /// One-particle levels, shaped `(o, s, o, s)`.
    pub muimp: Array4<C64>,
    /// Interaction in the half-prefactor convention, shaped `(2N)^4`.
    pub umatrix: Array4<C64>,
    /// Conserved quantities.
    pub quantum_numbers: Vec<String>,
    /// Paramagnetic symmetrisation (never requested by this driver).
    pub paramagnetic: bool,
}

/// What a single engine call should sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Invocation {
    /// Partition-function sector measurement.
    Standard,
    /// Worm measurement of one compound component in a worm sector.
    Component {
        /// Engine worm sector number.
        sector: u32,
        /// Compound component index.
        component: u64,
    },
}

/// A complete engine call.
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    /// Problem in engine layout.
    pub problem: &'a EngineProblem,
    /// Engine options for this call.
    pub config: &'a EngineConfiguration,
    /// Seed of the calling process.
    pub seed: u64,
    /// Sampling target.
    pub invocation: Invocation,
}

/// Raw per-process observables keyed by name.
///
/// Every array carries a leading axis enumerating the local replicates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineOutput {
    /// Observable name to local samples.
    pub observables: BTreeMap<String, ArrayD<C64>>,
}

impl EngineOutput {
    /// Inserts an observable.
    pub fn insert(&mut self, key: impl Into<String>, samples: ArrayD<C64>) {
        self.observables.insert(key.into(), samples);
    }

    /// Looks up an observable by exact name.
    pub fn require(&self, key: &str) -> Result<&ArrayD<C64>, SolverError> {
        self.observables.get(key).ok_or_else(|| {
            SolverError::Engine(
                ErrorInfo::new("missing-observable", "engine output lacks an observable")
                    .with_context("key", key),
            )
        })
    }

    /// Finds the single observable whose name contains `fragment`.
    pub fn find_unique(&self, fragment: &str) -> Result<(&str, &ArrayD<C64>), SolverError> {
        let mut matches = self
            .observables
            .iter()
            .filter(|(name, _)| name.contains(fragment));
        match (matches.next(), matches.next()) {
            (Some((name, data)), None) => Ok((name.as_str(), data)),
            (None, _) => Err(SolverError::Engine(
                ErrorInfo::new("missing-observable", "engine output lacks a worm observable")
                    .with_context("fragment", fragment),
            )),
            (Some(_), Some(_)) => Err(SolverError::Engine(
                ErrorInfo::new(
                    "ambiguous-observable",
                    "engine output holds more than one matching worm observable",
                )
                .with_context("fragment", fragment),
            )),
        }
    }
}

/// Result of one engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineResult {
    /// Standard measurement output.
    Standard(EngineOutput),
    /// Component measurement: generator-sector statistics and component output.
    Component {
        /// Statistics of the generating (partition function) sector.
        generator: EngineOutput,
        /// Worm observables of the sampled component.
        component: EngineOutput,
    },
}

impl EngineResult {
    /// Output of a standard invocation.
    pub fn into_standard(self) -> Result<EngineOutput, SolverError> {
        match self {
            EngineResult::Standard(output) => Ok(output),
            EngineResult::Component { .. } => Err(SolverError::engine(
                "unexpected-result",
                "engine answered a standard invocation with component output",
            )),
        }
    }

    /// Output pair of a component invocation.
    pub fn into_component(self) -> Result<(EngineOutput, EngineOutput), SolverError> {
        match self {
            EngineResult::Component {
                generator,
                component,
            } => Ok((generator, component)),
            EngineResult::Standard(_) => Err(SolverError::engine(
                "unexpected-result",
                "engine answered a component invocation with standard output",
            )),
        }
    }
}

/// The external CT-HYB sampling engine.
///
/// Each call blocks until sampling finishes. Failures are reported through
/// [`SolverError::Engine`] and are never retried by the driver.
pub trait ImpurityEngine {
    /// Runs one Monte Carlo simulation.
    fn invoke(&mut self, request: &EngineRequest<'_>) -> Result<EngineResult, SolverError>;
}
