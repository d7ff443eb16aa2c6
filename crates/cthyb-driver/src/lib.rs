#![deny(missing_docs)]

//! Solve orchestration for a continuous-time hybridization-expansion impurity
//! solver engine.
//!
//! A solve call translates the caller's options into engine options, maps
//! the problem tensors into the engine layout, selects a measurement sector,
//! invokes the engine once or per component, aggregates the samples of all
//! cooperating processes and converts them back into Green's-function
//! containers.

/// Ordered-flavour to compound-index bijection.
pub mod compound;
/// Component enumeration, pruning and budget apportionment.
pub mod components;
/// Engine option map and parameter translation.
pub mod config;
/// Conversion of aggregated observables into caller containers.
pub mod convert;
/// Per-sector measurement pipelines.
pub mod dispatch;
/// The engine seam.
pub mod engine;
/// Configuration fingerprints.
pub mod hash;
/// Construction-time setup and per-call options.
pub mod params;
/// Impurity problem in the caller's conventions.
pub mod problem;
/// Distributed mean and standard error.
pub mod sample;
/// Measurement sector selection.
pub mod sector;
/// Public `Solver` entry point.
pub mod solver;
/// Tensor layout conversion between caller and engine.
pub mod tensor;

pub use compound::{BandSpin, ComponentSpec};
pub use components::{Budget, ComponentPlan};
pub use config::{EngineConfiguration, OptionValue, ResolvedConfig};
pub use convert::{ComponentResult, TauResult};
pub use dispatch::{
    ComponentOutput, ReducedOutcome, SolveOutcome, StandardOutcome, TwoParticleOutcome,
    WormGreenOutcome,
};
pub use engine::{
    EngineOutput, EngineProblem, EngineRequest, EngineResult, ImpurityEngine, Invocation,
};
pub use params::{SolveParams, SolverSetup};
pub use problem::{ImpurityProblem, Interaction, InteractionConvention, OneBodyTerm};
pub use sample::{DistributedSample, Estimate, ProcessGroup, ReplicaGroup, SingleProcess};
pub use sector::{MeasurementSector, WormSector};
pub use solver::{DispatchPlan, Solver};

/// Version of the driver crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
