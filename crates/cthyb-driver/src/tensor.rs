//! Conversion of problem tensors between the caller's spin-major flavour
//! order (`s * N + o`) and the engine's layout where spin runs fastest
//! (`2 * o + s`, or explicit `(o, s)` axes).

use cthyb_core::{BlockGf, ErrorInfo, GfStruct, SolverError, C64};
use ndarray::{Array2, Array4, Array5, Zip};

use crate::engine::EngineProblem;
use crate::params::SolverSetup;
use crate::problem::{ImpurityProblem, InteractionConvention, OneBodyTerm};

fn shape_error(code: &str, message: &str, shape: &[usize]) -> SolverError {
    SolverError::Consistency(
        ErrorInfo::new(code, message).with_context("shape", format!("{shape:?}")),
    )
}

/// Number of orbitals encoded in a `(2N)^4` interaction tensor.
pub fn orbitals_from_interaction(tensor: &Array4<C64>) -> Result<usize, SolverError> {
    let shape = tensor.shape();
    let dim = shape[0];
    if shape.iter().any(|&axis| axis != dim) || dim % 2 != 0 || dim == 0 {
        return Err(shape_error(
            "interaction-shape",
            "interaction tensor must have shape (2N, 2N, 2N, 2N)",
            shape,
        ));
    }
    Ok(dim / 2)
}

/// Number of orbitals encoded in a `2N x 2N` hopping matrix.
pub fn orbitals_from_hopping(matrix: &Array2<C64>) -> Result<usize, SolverError> {
    let (rows, cols) = matrix.dim();
    if rows != cols || rows % 2 != 0 || rows == 0 {
        return Err(shape_error(
            "hopping-shape",
            "hopping matrix must have shape (2N, 2N)",
            &[rows, cols],
        ));
    }
    Ok(rows / 2)
}

/// Fails unless both tensors describe the same number of orbitals.
pub fn check_orbital_counts(from_interaction: usize, from_hopping: usize) -> Result<(), SolverError> {
    if from_interaction != from_hopping {
        return Err(SolverError::Consistency(
            ErrorInfo::new(
                "orbital-mismatch",
                "number of orbitals of U_ijkl and t_ij does not match",
            )
            .with_context("interaction", from_interaction.to_string())
            .with_context("hopping", from_hopping.to_string()),
        ));
    }
    Ok(())
}

/// Engine flavour of a spin-major caller flavour.
fn engine_flavour(caller: usize, n_orb: usize) -> usize {
    let spin = caller / n_orb;
    let orbital = caller % n_orb;
    2 * orbital + spin
}

/// Reorders the interaction so spin is fastest and converts it to the
/// `1/2 Σ U_ijkl c†_i c†_j c_l c_k` convention.
///
/// Monomial coefficients of `c†_i c†_j c_k c_l` pick up a factor `-2`: two
/// for the half prefactor and a sign for exchanging the annihilators.
pub fn interaction_to_engine(
    tensor: &Array4<C64>,
    convention: InteractionConvention,
) -> Result<Array4<C64>, SolverError> {
    let n_orb = orbitals_from_interaction(tensor)?;
    let factor = match convention {
        InteractionConvention::Monomial => C64::new(-2.0, 0.0),
        InteractionConvention::HalfPrefactor => C64::new(1.0, 0.0),
    };
    let dim = 2 * n_orb;
    let mut out = Array4::<C64>::zeros((dim, dim, dim, dim));
    for ((i, j, k, l), value) in tensor.indexed_iter() {
        out[[
            engine_flavour(i, n_orb),
            engine_flavour(j, n_orb),
            engine_flavour(k, n_orb),
            engine_flavour(l, n_orb),
        ]] = *value * factor;
    }
    Ok(out)
}

/// Inverse of the flavour reordering of [`interaction_to_engine`] (no prefactor).
///
/// Reads an engine-ordered tensor such as [`EngineProblem::umatrix`] back
/// into spin-major caller order, so a mapped problem can be inspected or
/// compared against its input. The driver itself only maps forward.
pub fn interaction_from_engine(tensor: &Array4<C64>) -> Result<Array4<C64>, SolverError> {
    let n_orb = orbitals_from_interaction(tensor)?;
    let dim = 2 * n_orb;
    let mut out = Array4::<C64>::zeros((dim, dim, dim, dim));
    for ((i, j, k, l), value) in out.indexed_iter_mut() {
        *value = tensor[[
            engine_flavour(i, n_orb),
            engine_flavour(j, n_orb),
            engine_flavour(k, n_orb),
            engine_flavour(l, n_orb),
        ]];
    }
    Ok(out)
}

/// Negates the hopping matrix and lays it out as `(o, s, o, s)`.
pub fn hopping_to_engine(matrix: &Array2<C64>, n_orb: usize) -> Result<Array4<C64>, SolverError> {
    check_orbital_counts(n_orb, orbitals_from_hopping(matrix)?)?;
    let mut out = Array4::<C64>::zeros((n_orb, 2, n_orb, 2));
    for ((row, col), value) in matrix.indexed_iter() {
        out[[row % n_orb, row / n_orb, col % n_orb, col / n_orb]] = -*value;
    }
    Ok(out)
}

/// Block-diagonal assembly of per-block level matrices.
pub fn block_diag(blocks: &[Array2<C64>]) -> Result<Array2<C64>, SolverError> {
    for (position, block) in blocks.iter().enumerate() {
        if !block.is_square() {
            return Err(SolverError::Consistency(
                ErrorInfo::new("levels-shape", "level matrices must be square")
                    .with_context("block", position.to_string())
                    .with_context("shape", format!("{:?}", block.shape())),
            ));
        }
    }
    let dim: usize = blocks.iter().map(|block| block.nrows()).sum();
    let mut out = Array2::<C64>::zeros((dim, dim));
    let mut offset = 0;
    for block in blocks {
        let size = block.nrows();
        out.slice_mut(ndarray::s![offset..offset + size, offset..offset + size])
            .assign(block);
        offset += size;
    }
    Ok(out)
}

/// Full one-particle matrix of the problem.
pub fn one_body_matrix(term: &OneBodyTerm) -> Result<Array2<C64>, SolverError> {
    match term {
        OneBodyTerm::Quadratic(matrix) => Ok(matrix.clone()),
        OneBodyTerm::Levels(blocks) => block_diag(blocks),
    }
}

/// Converts a particle propagator into the hole propagator `-Δ(β - τ)`.
pub fn hole_propagator(delta: &BlockGf) -> BlockGf {
    let mut flipped = delta.clone();
    for (target, (_, source)) in flipped.blocks_mut().zip(delta.iter()) {
        let n_tau = source.shape()[0];
        for tau in 0..n_tau {
            let reversed = source.index_axis(ndarray::Axis(0), n_tau - 1 - tau);
            Zip::from(target.index_axis_mut(ndarray::Axis(0), tau))
                .and(&reversed)
                .for_each(|out, &value| *out = -value);
        }
    }
    flipped
}

/// Lays a block hybridization out as the full `(tau, o, s, o, s)` array.
pub fn hybridization_to_engine(delta: &BlockGf, n_orb: usize) -> Result<Array5<C64>, SolverError> {
    let structure = delta.structure();
    check_flavour_count(structure, n_orb)?;
    let n_tau = delta.mesh().len();
    let mut out = Array5::<C64>::zeros((n_tau, n_orb, 2, n_orb, 2));
    for ((_, block), offset) in delta.iter().zip(structure.offsets()) {
        for ((tau, a, b), value) in block.indexed_iter() {
            let (row, col) = (offset + a, offset + b);
            out[[tau, row % n_orb, row / n_orb, col % n_orb, col / n_orb]] = *value;
        }
    }
    Ok(out)
}

/// Fails unless the block structure spans exactly `2N` flavours.
pub fn check_flavour_count(structure: &GfStruct, n_orb: usize) -> Result<(), SolverError> {
    if structure.total_size() != 2 * n_orb {
        return Err(SolverError::Consistency(
            ErrorInfo::new(
                "block-structure",
                "block structure does not span 2 * n_orb flavours",
            )
            .with_context("flavours", structure.total_size().to_string())
            .with_context("n_orb", n_orb.to_string()),
        ));
    }
    Ok(())
}

/// Fails unless the setup, the hybridization and the interaction agree on
/// the flavour layout.
pub fn check_problem_layout(
    setup: &SolverSetup,
    problem: &ImpurityProblem,
    n_orb: usize,
) -> Result<(), SolverError> {
    check_flavour_count(&setup.gf_struct, n_orb)?;
    let delta_structure = problem.delta_tau.structure();
    if delta_structure != &setup.gf_struct {
        return Err(SolverError::Consistency(
            ErrorInfo::new(
                "structure-mismatch",
                "hybridization block structure differs from the solver setup",
            )
            .with_context("setup", format!("{:?}", setup.gf_struct.blocks()))
            .with_context("delta", format!("{:?}", delta_structure.blocks())),
        ));
    }
    Ok(())
}

fn real_part<D: ndarray::Dimension>(array: &mut ndarray::Array<C64, D>) {
    array.mapv_inplace(|value| C64::new(value.re, 0.0));
}

/// Builds the engine problem: reorders the interaction, converts the
/// one-particle term and flips the hybridization into a hole propagator.
pub fn map_problem(
    setup: &SolverSetup,
    problem: &ImpurityProblem,
) -> Result<EngineProblem, SolverError> {
    let n_orb = orbitals_from_interaction(&problem.interaction.tensor)?;
    let hopping = one_body_matrix(&problem.one_body)?;
    let mut umatrix = interaction_to_engine(&problem.interaction.tensor, problem.interaction.convention)?;
    let mut muimp = hopping_to_engine(&hopping, n_orb)?;
    let mut ftau = hybridization_to_engine(&hole_propagator(&problem.delta_tau), n_orb)?;
    if !setup.complex {
        real_part(&mut umatrix);
        real_part(&mut muimp);
        real_part(&mut ftau);
    }
    Ok(EngineProblem {
        beta: setup.beta,
        n_orb,
        ftau,
        muimp,
        umatrix,
        quantum_numbers: problem.quantum_numbers.clone(),
        paramagnetic: false,
    })
}
