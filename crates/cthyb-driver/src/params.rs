use cthyb_core::{GfStruct, SeedPolicy};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::compound::ComponentSpec;
use crate::config::OptionValue;

/// Construction-time description of the response functions a solver produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSetup {
    /// Inverse temperature.
    pub beta: f64,
    /// Block structure of every Green's function exchanged with the caller.
    pub gf_struct: GfStruct,
    /// Number of non-negative Matsubara frequencies.
    #[serde(default = "default_n_iw")]
    pub n_iw: usize,
    /// Number of imaginary-time points on the caller's mesh.
    #[serde(default = "default_n_tau")]
    pub n_tau: usize,
    /// Number of Legendre coefficients.
    #[serde(default = "default_n_l")]
    pub n_l: usize,
    /// The hybridization is supplied directly together with a quadratic term.
    #[serde(default)]
    pub delta_interface: bool,
    /// Complex-valued impurity model.
    #[serde(default)]
    pub complex: bool,
}

fn default_n_iw() -> usize {
    1025
}

fn default_n_tau() -> usize {
    10001
}

fn default_n_l() -> usize {
    30
}

impl SolverSetup {
    /// Setup with default mesh sizes for the given temperature and blocks.
    pub fn new(beta: f64, gf_struct: GfStruct) -> Self {
        Self {
            beta,
            gf_struct,
            n_iw: default_n_iw(),
            n_tau: default_n_tau(),
            n_l: default_n_l(),
            delta_interface: false,
            complex: false,
        }
    }
}

/// Flat high-level options of a single solve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveParams {
    /// Number of measurement cycles.
    pub n_cycles: u64,
    /// Number of thermalisation cycles.
    #[serde(default = "default_warmup_cycles")]
    pub n_warmup_cycles: u64,
    /// Wall-clock budget in seconds; overrides cycle-count based stopping.
    #[serde(default)]
    pub max_time: Option<f64>,
    /// Proposed moves per cycle.
    #[serde(default = "default_length_cycle")]
    pub length_cycle: u64,
    /// Base random seed; rank `r` uses `random_seed + r`.
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Enable worm sampling.
    #[serde(default)]
    pub worm: bool,
    /// Worm insertion move weight (zero falls back to the default).
    #[serde(default = "default_worm_percentage")]
    pub percentage_worm_insert: f64,
    /// Worm replacement move weight (zero falls back to the default).
    #[serde(default = "default_worm_percentage")]
    pub percentage_worm_replace: f64,
    /// Explicit components for the automatic two-particle pipeline.
    #[serde(default)]
    pub worm_components: Option<Vec<ComponentSpec>>,
    /// Hybridization magnitude below which two-operator components are skipped.
    #[serde(default = "default_prune_threshold")]
    pub worm_prune_threshold: Option<f64>,
    /// Enable the four-operator double move.
    #[serde(default = "default_true")]
    pub move_double: bool,
    /// Global move probability.
    #[serde(default = "default_global_prob")]
    pub move_global_prob: f64,
    /// Measure the imaginary-time Green's function.
    #[serde(default = "default_true")]
    pub measure_g_tau: bool,
    /// Measure Legendre coefficients.
    #[serde(default)]
    pub measure_g_l: bool,
    /// Measure the perturbation-order histogram.
    #[serde(default)]
    pub measure_pert_order: bool,
    /// Enable state sampling.
    #[serde(default)]
    pub statesampling: bool,
    /// Enable flavour-changing moves.
    #[serde(default)]
    pub flavourchange_moves: bool,
    /// Sample every component of the particle-hole two-particle Green's function.
    #[serde(default)]
    pub measure_g2_iw_ph: bool,
    /// Fermionic frequencies of the two-particle measurement.
    #[serde(default = "default_g2_frequencies")]
    pub measure_g2_n_fermionic: u64,
    /// Bosonic frequencies of the two-particle measurement.
    #[serde(default = "default_g2_frequencies")]
    pub measure_g2_n_bosonic: u64,
    /// Raw engine options written to the QMC section last.
    #[serde(default)]
    pub cfg_qmc: IndexMap<String, OptionValue>,
}

fn default_warmup_cycles() -> u64 {
    5000
}

fn default_length_cycle() -> u64 {
    50
}

fn default_random_seed() -> u64 {
    1
}

fn default_worm_percentage() -> f64 {
    0.20
}

fn default_prune_threshold() -> Option<f64> {
    Some(1e-5)
}

fn default_true() -> bool {
    true
}

fn default_global_prob() -> f64 {
    0.005
}

fn default_g2_frequencies() -> u64 {
    30
}

impl SolveParams {
    /// Options with every default applied and the given cycle count.
    pub fn with_cycles(n_cycles: u64) -> Self {
        Self {
            n_cycles,
            n_warmup_cycles: default_warmup_cycles(),
            max_time: None,
            length_cycle: default_length_cycle(),
            random_seed: default_random_seed(),
            worm: false,
            percentage_worm_insert: default_worm_percentage(),
            percentage_worm_replace: default_worm_percentage(),
            worm_components: None,
            worm_prune_threshold: default_prune_threshold(),
            move_double: true,
            move_global_prob: default_global_prob(),
            measure_g_tau: true,
            measure_g_l: false,
            measure_pert_order: false,
            statesampling: false,
            flavourchange_moves: false,
            measure_g2_iw_ph: false,
            measure_g2_n_fermionic: default_g2_frequencies(),
            measure_g2_n_bosonic: default_g2_frequencies(),
            cfg_qmc: IndexMap::new(),
        }
    }

    /// Seeding policy derived from the base seed.
    pub fn seed_policy(&self) -> SeedPolicy {
        SeedPolicy::new(self.random_seed)
    }

    /// Whether a positive wall-clock budget was requested.
    pub fn has_time_budget(&self) -> bool {
        matches!(self.max_time, Some(limit) if limit > 0.0)
    }
}
