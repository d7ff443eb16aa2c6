use cthyb_core::{BlockGf, C64};
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};

/// Quadratic part of the impurity Hamiltonian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum OneBodyTerm {
    /// Full `2N x 2N` matrix `h_0` in spin-major flavour order.
    Quadratic(Array2<C64>),
    /// Per-block level matrices, as extracted from a non-interacting propagator.
    Levels(Vec<Array2<C64>>),
}

/// Ordering convention of the caller's interaction coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionConvention {
    /// Coefficients `M_ijkl` of `c†_i c†_j c_k c_l` monomials.
    #[default]
    Monomial,
    /// Already `1/2 Σ U_ijkl c†_i c†_j c_l c_k`.
    HalfPrefactor,
}

/// Two-body interaction tensor in spin-major flavour order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Convention the coefficients are written in.
    #[serde(default)]
    pub convention: InteractionConvention,
    /// Rank-4 tensor of shape `(2N)^4`.
    pub tensor: Array4<C64>,
}

impl Interaction {
    /// Monomial coefficients as extracted from an operator expression.
    pub fn monomial(tensor: Array4<C64>) -> Self {
        Self {
            convention: InteractionConvention::Monomial,
            tensor,
        }
    }

    /// Coefficients already in the engine's half-prefactor convention.
    pub fn half_prefactor(tensor: Array4<C64>) -> Self {
        Self {
            convention: InteractionConvention::HalfPrefactor,
            tensor,
        }
    }
}

fn default_quantum_numbers() -> Vec<String> {
    vec!["Nt".to_string(), "All".to_string()]
}

/// Impurity problem in the caller's conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpurityProblem {
    /// Hybridization function `Δ(τ)` as a particle propagator.
    pub delta_tau: BlockGf,
    /// Quadratic Hamiltonian term.
    pub one_body: OneBodyTerm,
    /// Two-body interaction.
    pub interaction: Interaction,
    /// Conserved quantities used to block the local Hamiltonian.
    #[serde(default = "default_quantum_numbers")]
    pub quantum_numbers: Vec<String>,
}

impl ImpurityProblem {
    /// Problem conserving the total particle number with automatic block minimisation.
    pub fn new(delta_tau: BlockGf, one_body: OneBodyTerm, interaction: Interaction) -> Self {
        Self {
            delta_tau,
            one_body,
            interaction,
            quantum_numbers: default_quantum_numbers(),
        }
    }

    /// Whether any hybridization block couples more than one flavour.
    pub fn offdiagonal(&self) -> bool {
        self.delta_tau.structure().max_block_size() > 1
    }

    /// Whether the full quadratic Hamiltonian accompanies the hybridization.
    pub fn has_quadratic_term(&self) -> bool {
        matches!(self.one_body, OneBodyTerm::Quadratic(_))
    }
}
