//! Minimal Green's-function containers exchanged with the caller.
//!
//! Only the read/write surface needed by the converters lives here: meshes
//! that know their length, block structures that know their offsets, and
//! dense complex arrays per block.

use std::collections::BTreeMap;

use ndarray::{Array3, ArrayD, ArrayView3, IxDyn};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, SolverError};

/// Quantum statistics of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Antiperiodic in imaginary time.
    Fermion,
    /// Periodic in imaginary time.
    Boson,
}

/// One-dimensional mesh on which a Green's function is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mesh {
    /// Equidistant imaginary-time points including both end points `0` and `beta`.
    ImTime {
        /// Inverse temperature.
        beta: f64,
        /// Statistic of the sampled quantity.
        statistic: Statistic,
        /// Number of points.
        n_tau: usize,
    },
    /// Symmetric set of Matsubara frequencies.
    ImFreq {
        /// Inverse temperature.
        beta: f64,
        /// Statistic of the sampled quantity.
        statistic: Statistic,
        /// Number of non-negative frequencies.
        n_max: usize,
    },
}

impl Mesh {
    /// Fermionic imaginary-time mesh.
    pub fn fermionic_tau(beta: f64, n_tau: usize) -> Self {
        Mesh::ImTime {
            beta,
            statistic: Statistic::Fermion,
            n_tau,
        }
    }

    /// Fermionic Matsubara mesh with `2 * n_max` points.
    pub fn fermionic_iw(beta: f64, n_max: usize) -> Self {
        Mesh::ImFreq {
            beta,
            statistic: Statistic::Fermion,
            n_max,
        }
    }

    /// Bosonic Matsubara mesh with `2 * n_max - 1` points.
    pub fn bosonic_iw(beta: f64, n_max: usize) -> Self {
        Mesh::ImFreq {
            beta,
            statistic: Statistic::Boson,
            n_max,
        }
    }

    /// Bosonic imaginary-time mesh.
    pub fn bosonic_tau(beta: f64, n_tau: usize) -> Self {
        Mesh::ImTime {
            beta,
            statistic: Statistic::Boson,
            n_tau,
        }
    }

    /// Inverse temperature of the mesh.
    pub fn beta(&self) -> f64 {
        match self {
            Mesh::ImTime { beta, .. } | Mesh::ImFreq { beta, .. } => *beta,
        }
    }

    /// Number of points stored along this mesh.
    pub fn len(&self) -> usize {
        match *self {
            Mesh::ImTime { n_tau, .. } => n_tau,
            Mesh::ImFreq {
                statistic: Statistic::Fermion,
                n_max,
                ..
            } => 2 * n_max,
            Mesh::ImFreq {
                statistic: Statistic::Boson,
                n_max,
                ..
            } => (2 * n_max).saturating_sub(1),
        }
    }

    /// Whether the mesh holds no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name and matrix dimension of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Block label, e.g. `up` or `down_0`.
    pub name: String,
    /// Matrix dimension of the block.
    pub size: usize,
}

/// Block structure of a Green's function.
///
/// Blocks are laid out consecutively along the diagonal of the full
/// flavour matrix in spin-major order (`s * n_orb + o`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GfStruct {
    blocks: Vec<BlockSpec>,
}

impl GfStruct {
    /// Builds a block structure from `(name, size)` pairs.
    pub fn new<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            blocks: blocks
                .into_iter()
                .map(|(name, size)| BlockSpec {
                    name: name.into(),
                    size,
                })
                .collect(),
        }
    }

    /// Blocks in declaration order.
    pub fn blocks(&self) -> &[BlockSpec] {
        &self.blocks
    }

    /// Total dimension of the flavour space.
    pub fn total_size(&self) -> usize {
        self.blocks.iter().map(|block| block.size).sum()
    }

    /// Largest block dimension (zero for an empty structure).
    pub fn max_block_size(&self) -> usize {
        self.blocks.iter().map(|block| block.size).max().unwrap_or(0)
    }

    /// Offset of every block along the full flavour axis.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.blocks
            .iter()
            .map(|block| {
                let start = offset;
                offset += block.size;
                start
            })
            .collect()
    }

    /// Locates a full (spin-major) flavour index as `(block, inner index)`.
    pub fn locate(&self, flavour: usize) -> Option<(usize, usize)> {
        let mut offset = 0;
        for (index, block) in self.blocks.iter().enumerate() {
            if flavour < offset + block.size {
                return Some((index, flavour - offset));
            }
            offset += block.size;
        }
        None
    }
}

/// Block-diagonal Green's function on a single mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlockGf")]
pub struct BlockGf {
    mesh: Mesh,
    structure: GfStruct,
    blocks: Vec<Array3<Complex64>>,
}

/// Unchecked wire form of [`BlockGf`].
#[derive(Deserialize)]
struct RawBlockGf {
    mesh: Mesh,
    structure: GfStruct,
    blocks: Vec<Array3<Complex64>>,
}

impl TryFrom<RawBlockGf> for BlockGf {
    type Error = SolverError;

    fn try_from(raw: RawBlockGf) -> Result<Self, Self::Error> {
        Self::from_blocks(raw.mesh, &raw.structure, raw.blocks)
    }
}

impl BlockGf {
    /// Creates a zero-initialised block Green's function.
    pub fn zeros(mesh: Mesh, structure: &GfStruct) -> Self {
        let blocks = structure
            .blocks()
            .iter()
            .map(|block| Array3::zeros((mesh.len(), block.size, block.size)))
            .collect();
        Self {
            mesh,
            structure: structure.clone(),
            blocks,
        }
    }

    /// Wraps existing block data after checking every block shape.
    pub fn from_blocks(
        mesh: Mesh,
        structure: &GfStruct,
        blocks: Vec<Array3<Complex64>>,
    ) -> Result<Self, SolverError> {
        if blocks.len() != structure.blocks().len() {
            return Err(SolverError::Consistency(
                ErrorInfo::new("block-count", "block data does not match block structure")
                    .with_context("expected", structure.blocks().len().to_string())
                    .with_context("found", blocks.len().to_string()),
            ));
        }
        for (spec, data) in structure.blocks().iter().zip(blocks.iter()) {
            let expected = (mesh.len(), spec.size, spec.size);
            if data.dim() != expected {
                return Err(SolverError::Consistency(
                    ErrorInfo::new("block-shape", "block data has an unexpected shape")
                        .with_context("block", spec.name.clone())
                        .with_context("expected", format!("{expected:?}"))
                        .with_context("found", format!("{:?}", data.dim())),
                ));
            }
        }
        Ok(Self {
            mesh,
            structure: structure.clone(),
            blocks,
        })
    }

    /// Mesh shared by all blocks.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Block structure.
    pub fn structure(&self) -> &GfStruct {
        &self.structure
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the container holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Data of a block by name, shaped `(mesh, n, n)`.
    pub fn block(&self, name: &str) -> Option<ArrayView3<'_, Complex64>> {
        self.position(name).map(|index| self.blocks[index].view())
    }

    /// Mutable data of a block by name.
    pub fn block_mut(&mut self, name: &str) -> Option<&mut Array3<Complex64>> {
        let index = self.position(name)?;
        Some(&mut self.blocks[index])
    }

    /// Iterates over `(name, data)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array3<Complex64>)> {
        self.structure
            .blocks()
            .iter()
            .map(|spec| spec.name.as_str())
            .zip(self.blocks.iter())
    }

    /// Iterates mutably over block data in declaration order.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Array3<Complex64>> {
        self.blocks.iter_mut()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.structure
            .blocks()
            .iter()
            .position(|spec| spec.name == name)
    }
}

/// Scalar-valued function on a product of meshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarGf {
    /// Meshes, one per array axis.
    pub meshes: Vec<Mesh>,
    /// Values shaped by the mesh lengths.
    pub data: ArrayD<Complex64>,
}

impl ScalarGf {
    /// Creates a zero-initialised function on the given meshes.
    pub fn zeros(meshes: Vec<Mesh>) -> Self {
        let shape: Vec<usize> = meshes.iter().map(Mesh::len).collect();
        Self {
            meshes,
            data: ArrayD::zeros(IxDyn(&shape)),
        }
    }

    /// Replaces the data after checking its shape against the meshes.
    pub fn set_data(&mut self, data: ArrayD<Complex64>) -> Result<(), SolverError> {
        let expected: Vec<usize> = self.meshes.iter().map(Mesh::len).collect();
        if data.shape() != expected.as_slice() {
            return Err(SolverError::Consistency(
                ErrorInfo::new("mesh-shape", "data does not match mesh product")
                    .with_context("expected", format!("{expected:?}"))
                    .with_context("found", format!("{:?}", data.shape())),
            ));
        }
        self.data = data;
        Ok(())
    }
}

/// Two-particle function indexed by pairs of blocks.
///
/// Each entry is shaped `(bosonic, fermionic, fermionic, n_a, n_a, n_b, n_b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block2Gf {
    /// Meshes in the order `(bosonic, fermionic, fermionic)`.
    pub meshes: [Mesh; 3],
    /// Block structure on both block axes.
    pub structure: GfStruct,
    /// Data keyed by `(block_a, block_b)` names.
    pub blocks: BTreeMap<(String, String), ArrayD<Complex64>>,
}

impl Block2Gf {
    /// Creates zero data for every block pair.
    pub fn zeros(meshes: [Mesh; 3], structure: &GfStruct) -> Self {
        let mut blocks = BTreeMap::new();
        for a in structure.blocks() {
            for b in structure.blocks() {
                let shape = [
                    meshes[0].len(),
                    meshes[1].len(),
                    meshes[2].len(),
                    a.size,
                    a.size,
                    b.size,
                    b.size,
                ];
                blocks.insert(
                    (a.name.clone(), b.name.clone()),
                    ArrayD::zeros(IxDyn(&shape)),
                );
            }
        }
        Self {
            meshes,
            structure: structure.clone(),
            blocks,
        }
    }

    /// Data for a block pair.
    pub fn get(&self, a: &str, b: &str) -> Option<&ArrayD<Complex64>> {
        self.blocks.get(&(a.to_string(), b.to_string()))
    }
}

/// Transform from imaginary time to Matsubara frequencies supplied by the caller.
pub trait FourierTransform {
    /// Transforms one block shaped `(tau, n, n)` onto `iw_mesh`.
    ///
    /// `known_moments` is shaped `(order, n, n)` and holds the leading
    /// high-frequency tail coefficients.
    fn tau_to_iw(
        &self,
        g_tau: ArrayView3<'_, Complex64>,
        tau_mesh: &Mesh,
        iw_mesh: &Mesh,
        known_moments: ArrayView3<'_, Complex64>,
    ) -> Result<Array3<Complex64>, SolverError>;
}
