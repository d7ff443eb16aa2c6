//! Mean and standard error of per-process Monte Carlo samples.
//!
//! Every reduction here is collective: all processes of the group must
//! reach it for the same observable in the same order. Divergent component
//! lists between processes are not detected and yield meaningless estimates.

use cthyb_core::{ErrorInfo, SolverError, C64};
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

/// Group of cooperating sampling processes.
pub trait ProcessGroup {
    /// Rank of the calling process.
    fn rank(&self) -> usize;

    /// Number of processes.
    fn size(&self) -> usize;

    /// Collects the array of every process, ordered by rank.
    fn all_gather(&self, local: &ArrayD<C64>) -> Result<Vec<ArrayD<C64>>, SolverError>;
}

/// A group consisting of the calling process only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, local: &ArrayD<C64>) -> Result<Vec<ArrayD<C64>>, SolverError> {
        Ok(vec![local.clone()])
    }
}

#[derive(Debug, Clone)]
enum Peers {
    Mirror(usize),
    Fixed(Vec<ArrayD<C64>>),
}

/// Group whose peer contributions are known in advance.
///
/// Used to re-aggregate samples that were gathered elsewhere and to model
/// groups of identical replicas.
#[derive(Debug, Clone)]
pub struct ReplicaGroup {
    rank: usize,
    peers: Peers,
}

impl ReplicaGroup {
    /// Group of `size` processes that all hold the caller's data.
    pub fn mirrored(rank: usize, size: usize) -> Self {
        Self {
            rank,
            peers: Peers::Mirror(size.max(1)),
        }
    }

    /// Group whose other ranks contribute `peers` (in rank order, skipping `rank`).
    pub fn with_peers(rank: usize, peers: Vec<ArrayD<C64>>) -> Self {
        Self {
            rank: rank.min(peers.len()),
            peers: Peers::Fixed(peers),
        }
    }
}

impl ProcessGroup for ReplicaGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        match &self.peers {
            Peers::Mirror(size) => *size,
            Peers::Fixed(peers) => peers.len() + 1,
        }
    }

    fn all_gather(&self, local: &ArrayD<C64>) -> Result<Vec<ArrayD<C64>>, SolverError> {
        match &self.peers {
            Peers::Mirror(size) => Ok(vec![local.clone(); *size]),
            Peers::Fixed(peers) => {
                if let Some(peer) = peers.iter().find(|peer| peer.shape() != local.shape()) {
                    return Err(SolverError::Consistency(
                        ErrorInfo::new("peer-shape", "peer sample shape differs from local")
                            .with_context("local", format!("{:?}", local.shape()))
                            .with_context("peer", format!("{:?}", peer.shape())),
                    ));
                }
                let mut gathered = peers.clone();
                gathered.insert(self.rank, local.clone());
                Ok(gathered)
            }
        }
    }
}

/// Mean and standard error of one observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Element-wise mean over the group.
    pub mean: ArrayD<C64>,
    /// Element-wise standard error of the mean.
    pub error: ArrayD<C64>,
}

/// A process-local sample bound to its process group.
pub struct DistributedSample<'g> {
    local: ArrayD<C64>,
    group: &'g dyn ProcessGroup,
    ntotal: usize,
}

impl std::fmt::Debug for DistributedSample<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedSample")
            .field("shape", &self.local.shape())
            .field("ntotal", &self.ntotal)
            .finish_non_exhaustive()
    }
}

impl<'g> DistributedSample<'g> {
    /// Wraps a single local value per element.
    pub fn new(local: ArrayD<C64>, group: &'g dyn ProcessGroup) -> Self {
        Self {
            local,
            group,
            ntotal: group.size(),
        }
    }

    /// Wraps local replicates stacked along axis 0, averaging them first so
    /// no local data is dropped.
    pub fn from_replicates(
        replicates: &ArrayD<C64>,
        group: &'g dyn ProcessGroup,
    ) -> Result<Self, SolverError> {
        Ok(Self::new(collapse_replicates(replicates)?, group))
    }

    /// Process-local value.
    pub fn local(&self) -> &ArrayD<C64> {
        &self.local
    }

    /// Total number of samples across the group.
    pub fn ntotal(&self) -> usize {
        self.ntotal
    }

    /// Applies a local transformation, keeping the group binding.
    pub fn apply<F>(self, transform: F) -> Self
    where
        F: FnOnce(ArrayD<C64>) -> ArrayD<C64>,
    {
        Self {
            local: transform(self.local),
            group: self.group,
            ntotal: self.ntotal,
        }
    }

    /// Element-wise mean over the group.
    pub fn mean(&self) -> Result<ArrayD<C64>, SolverError> {
        let gathered = self.group.all_gather(&self.local)?;
        Ok(mean_of(&gathered, &self.local))
    }

    /// Element-wise standard error of the mean; zero for a single process.
    pub fn stderr(&self) -> Result<ArrayD<C64>, SolverError> {
        if self.ntotal <= 1 {
            return Ok(ArrayD::zeros(self.local.raw_dim()));
        }
        let gathered = self.group.all_gather(&self.local)?;
        let mean = mean_of(&gathered, &self.local);
        Ok(stderr_of(&gathered, &mean))
    }

    /// Mean and standard error from a single gather.
    pub fn estimate(&self) -> Result<Estimate, SolverError> {
        let gathered = self.group.all_gather(&self.local)?;
        let mean = mean_of(&gathered, &self.local);
        let error = if gathered.len() <= 1 {
            ArrayD::zeros(self.local.raw_dim())
        } else {
            stderr_of(&gathered, &mean)
        };
        Ok(Estimate { mean, error })
    }
}

/// Averages the leading replicate axis of a local sample.
pub fn collapse_replicates(replicates: &ArrayD<C64>) -> Result<ArrayD<C64>, SolverError> {
    if replicates.ndim() == 0 || replicates.len_of(Axis(0)) == 0 {
        return Err(SolverError::Engine(
            ErrorInfo::new("no-local-samples", "observable holds no local replicate")
                .with_context("shape", format!("{:?}", replicates.shape())),
        ));
    }
    replicates.mean_axis(Axis(0)).ok_or_else(|| {
        SolverError::engine("no-local-samples", "observable holds no local replicate")
    })
}

fn mean_of(gathered: &[ArrayD<C64>], local: &ArrayD<C64>) -> ArrayD<C64> {
    let mut sum = ArrayD::<C64>::zeros(local.raw_dim());
    for sample in gathered {
        sum += sample;
    }
    let count = gathered.len().max(1) as f64;
    sum.mapv(|value| value / count)
}

/// Sample standard deviation of real and imaginary parts, divided by `√n`.
fn stderr_of(gathered: &[ArrayD<C64>], mean: &ArrayD<C64>) -> ArrayD<C64> {
    let count = gathered.len() as f64;
    let mut sq = ArrayD::<C64>::zeros(mean.raw_dim());
    for sample in gathered {
        ndarray::Zip::from(&mut sq)
            .and(sample)
            .and(mean)
            .for_each(|acc, value, centre| {
                let delta = value - centre;
                acc.re += delta.re * delta.re;
                acc.im += delta.im * delta.im;
            });
    }
    sq.mapv(|acc| {
        C64::new(
            (acc.re / (count - 1.0)).sqrt() / count.sqrt(),
            (acc.im / (count - 1.0)).sqrt() / count.sqrt(),
        )
    })
}
