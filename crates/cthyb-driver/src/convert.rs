//! Conversion of aggregated engine observables into the caller's
//! Green's-function containers.
//!
//! Engine arrays use `(o, s)` flavour axes with spin running fastest. Caller
//! blocks sit consecutively on the diagonal of the spin-major flavour matrix
//! (`s * n_orb + o`).

use cthyb_core::{
    Block2Gf, BlockGf, ErrorInfo, FourierTransform, GfStruct, Mesh, ScalarGf, SolverError, C64,
};
use log::debug;
use ndarray::{Array3, ArrayD, Axis, Ix3, IxDyn, Zip};

use crate::compound::index_to_component;
use crate::components::FOUR_OPERATORS;
use crate::sample::Estimate;
use crate::tensor::check_flavour_count;

fn unexpected_shape(code: &str, expected: String, found: &[usize]) -> SolverError {
    SolverError::Consistency(
        ErrorInfo::new(code, "engine observable has an unexpected shape")
            .with_context("expected", expected)
            .with_context("found", format!("{found:?}")),
    )
}

/// Expands a diagonal `(o, s, ...)` array into `(o, s, o, s, ...)`.
pub fn diagonal_fill(diagonal: &ArrayD<C64>) -> Result<ArrayD<C64>, SolverError> {
    if diagonal.ndim() < 2 {
        return Err(unexpected_shape(
            "diagonal-shape",
            "(o, s, ...)".to_string(),
            diagonal.shape(),
        ));
    }
    let (n_orb, n_spin) = (diagonal.shape()[0], diagonal.shape()[1]);
    let mut shape = vec![n_orb, n_spin, n_orb, n_spin];
    shape.extend_from_slice(&diagonal.shape()[2..]);
    let mut full = ArrayD::<C64>::zeros(IxDyn(&shape));
    for o in 0..n_orb {
        for s in 0..n_spin {
            let source = diagonal
                .view()
                .index_axis_move(Axis(0), o)
                .index_axis_move(Axis(0), s);
            full.view_mut()
                .index_axis_move(Axis(0), o)
                .index_axis_move(Axis(0), s)
                .index_axis_move(Axis(0), o)
                .index_axis_move(Axis(0), s)
                .assign(&source);
        }
    }
    Ok(full)
}

/// Extracts the diagonal `(o, s, ...)` of an `(o, s, o, s, ...)` array.
pub fn diagonal_collapse(full: &ArrayD<C64>) -> Result<ArrayD<C64>, SolverError> {
    let shape = full.shape();
    if shape.len() < 4 || shape[0] != shape[2] || shape[1] != shape[3] {
        return Err(unexpected_shape(
            "diagonal-shape",
            "(o, s, o, s, ...)".to_string(),
            shape,
        ));
    }
    let (n_orb, n_spin) = (shape[0], shape[1]);
    let mut reduced = vec![n_orb, n_spin];
    reduced.extend_from_slice(&shape[4..]);
    let mut diagonal = ArrayD::<C64>::zeros(IxDyn(&reduced));
    for o in 0..n_orb {
        for s in 0..n_spin {
            let source = full
                .view()
                .index_axis_move(Axis(0), o)
                .index_axis_move(Axis(0), s)
                .index_axis_move(Axis(0), o)
                .index_axis_move(Axis(0), s);
            diagonal
                .view_mut()
                .index_axis_move(Axis(0), o)
                .index_axis_move(Axis(0), s)
                .assign(&source);
        }
    }
    Ok(diagonal)
}

/// Averages neighbouring bins of the last axis, halving its length.
pub fn pair_average_bins(binned: ArrayD<C64>) -> ArrayD<C64> {
    if binned.ndim() == 0 {
        return binned;
    }
    let last = Axis(binned.ndim() - 1);
    let n_out = binned.len_of(last) / 2;
    let mut shape = binned.shape().to_vec();
    shape[last.index()] = n_out;
    let mut out = ArrayD::<C64>::zeros(IxDyn(&shape));
    for idx in 0..n_out {
        let lower = binned.index_axis(last, 2 * idx);
        let upper = binned.index_axis(last, 2 * idx + 1);
        Zip::from(out.index_axis_mut(last, idx))
            .and(&lower)
            .and(&upper)
            .for_each(|target, &a, &b| *target = (a + b) * 0.5);
    }
    out
}

/// Checks that a full imaginary-time observable is shaped `(o, 2, o, 2, bins)`.
pub fn check_tau_shape(full: &ArrayD<C64>, n_orb: usize, bins: usize) -> Result<(), SolverError> {
    let expected = [n_orb, 2, n_orb, 2, bins];
    if full.shape() != expected {
        return Err(unexpected_shape(
            "gtau-shape",
            format!("{expected:?}"),
            full.shape(),
        ));
    }
    Ok(())
}

/// Distributes a `(o, s, o, s, tau)` array over the caller's blocks.
pub fn tau_to_block_gf(
    full: &ArrayD<C64>,
    structure: &GfStruct,
    mesh: Mesh,
) -> Result<BlockGf, SolverError> {
    let n_orb = full.shape().first().copied().unwrap_or(0);
    check_tau_shape(full, n_orb, mesh.len())?;
    check_flavour_count(structure, n_orb)?;
    let mut blocks = Vec::with_capacity(structure.blocks().len());
    for (spec, offset) in structure.blocks().iter().zip(structure.offsets()) {
        let mut block = Array3::<C64>::zeros((mesh.len(), spec.size, spec.size));
        for a in 0..spec.size {
            let row = offset + a;
            for b in 0..spec.size {
                let col = offset + b;
                let series = full
                    .view()
                    .index_axis_move(Axis(0), row % n_orb)
                    .index_axis_move(Axis(0), row / n_orb)
                    .index_axis_move(Axis(0), col % n_orb)
                    .index_axis_move(Axis(0), col / n_orb);
                block
                    .view_mut()
                    .index_axis_move(Axis(1), a)
                    .index_axis_move(Axis(1), b)
                    .assign(&series);
            }
        }
        blocks.push(block);
    }
    BlockGf::from_blocks(mesh, structure, blocks)
}

/// Imaginary-time Green's function with its error bars.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TauResult {
    /// Mean `G(τ)` per block.
    pub g_tau: BlockGf,
    /// Standard error of `G(τ)` per block.
    pub g_tau_error: BlockGf,
    /// `G(iω)` when a Fourier transform was supplied.
    pub g_iw: Option<BlockGf>,
}

/// Converts an aggregated `(o, s, o, s, tau)` estimate into block containers.
pub fn tau_result(
    estimate: &Estimate,
    structure: &GfStruct,
    mesh: Mesh,
) -> Result<TauResult, SolverError> {
    Ok(TauResult {
        g_tau: tau_to_block_gf(&estimate.mean, structure, mesh)?,
        g_tau_error: tau_to_block_gf(&estimate.error, structure, mesh)?,
        g_iw: None,
    })
}

/// High-frequency moments `(4, n, n)` of a normalised fermionic propagator.
pub fn known_moments(size: usize) -> Array3<C64> {
    let mut moments = Array3::<C64>::zeros((4, size, size));
    for i in 0..size {
        moments[[1, i, i]] = C64::new(1.0, 0.0);
    }
    moments
}

/// Fourier transforms every block of `g_tau` onto `iw_mesh`.
pub fn tau_to_iw(
    g_tau: &BlockGf,
    iw_mesh: Mesh,
    transform: &dyn FourierTransform,
) -> Result<BlockGf, SolverError> {
    let mut blocks = Vec::with_capacity(g_tau.len());
    for (_, block) in g_tau.iter() {
        let moments = known_moments(block.shape()[1]);
        blocks.push(transform.tau_to_iw(block.view(), g_tau.mesh(), &iw_mesh, moments.view())?);
    }
    BlockGf::from_blocks(iw_mesh, g_tau.structure(), blocks)
}

/// Mean and error of one sampled component on its own meshes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ComponentResult {
    /// Compound component index.
    pub component: u64,
    /// Mean value.
    pub mean: ScalarGf,
    /// Standard error.
    pub error: ScalarGf,
}

/// Wraps a component estimate in scalar containers on `meshes`.
pub fn component_result(
    component: u64,
    meshes: Vec<Mesh>,
    estimate: Estimate,
) -> Result<ComponentResult, SolverError> {
    let mut mean = ScalarGf::zeros(meshes.clone());
    mean.set_data(estimate.mean)?;
    let mut error = ScalarGf::zeros(meshes);
    error.set_data(estimate.error)?;
    Ok(ComponentResult {
        component,
        mean,
        error,
    })
}

/// Block pair and inner indices of a four-operator component, or `None`
/// when an operator pair straddles two blocks.
fn locate_four_operator(
    n_orb: usize,
    structure: &GfStruct,
    component: u64,
) -> Result<Option<[(usize, usize); 4]>, SolverError> {
    let pairs = index_to_component(n_orb, FOUR_OPERATORS, component)?;
    let mut located = [(0usize, 0usize); 4];
    for (slot, pair) in located.iter_mut().zip(&pairs) {
        match structure.locate(pair.spin * n_orb + pair.band) {
            Some(position) => *slot = position,
            None => return Ok(None),
        }
    }
    if located[0].0 != located[1].0 || located[2].0 != located[3].0 {
        return Ok(None);
    }
    Ok(Some(located))
}

/// Assembles per-component two-particle estimates shaped
/// `(fermionic, fermionic, bosonic)` into block-pair containers on
/// `(bosonic, fermionic, fermionic)` meshes. Returns mean and error.
pub fn g4_to_block2gf(
    components: &[ComponentResult],
    n_orb: usize,
    structure: &GfStruct,
    meshes: [Mesh; 3],
) -> Result<(Block2Gf, Block2Gf), SolverError> {
    check_flavour_count(structure, n_orb)?;
    let mut mean = Block2Gf::zeros(meshes, structure);
    let mut error = Block2Gf::zeros(meshes, structure);
    let names: Vec<String> = structure.blocks().iter().map(|b| b.name.clone()).collect();
    for result in components {
        let Some(located) = locate_four_operator(n_orb, structure, result.component)? else {
            debug!(
                "component {} couples different blocks; left out of G2",
                result.component
            );
            continue;
        };
        let key = (names[located[0].0].clone(), names[located[2].0].clone());
        let inner = [located[0].1, located[1].1, located[2].1, located[3].1];
        for (target, source) in [(&mut mean, &result.mean), (&mut error, &result.error)] {
            let data = source
                .data
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|_| {
                    unexpected_shape("g4iw-shape", "(f, f, b)".to_string(), source.data.shape())
                })?;
            let Some(entry) = target.blocks.get_mut(&key) else {
                continue;
            };
            for ((n1, n2, w), value) in data.indexed_iter() {
                let index = [w, n1, n2, inner[0], inner[1], inner[2], inner[3]];
                entry[&index[..]] = *value;
            }
        }
    }
    Ok((mean, error))
}
