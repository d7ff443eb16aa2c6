#![deny(missing_docs)]
#![doc = "Core error, seeding and Green's-function container types shared by the CT-HYB solve orchestrator."]

pub mod errors;
pub mod gf;
pub mod seed;

pub use errors::{ErrorInfo, SolverError};
pub use gf::{Block2Gf, BlockGf, BlockSpec, FourierTransform, GfStruct, Mesh, ScalarGf, Statistic};
pub use seed::{process_seed, SeedPolicy};

/// Complex scalar used for every numerical array exchanged with the engine.
pub type C64 = num_complex::Complex64;
