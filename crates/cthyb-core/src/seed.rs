//! Seeding policy for cooperating sampling processes.

use serde::{Deserialize, Serialize};

/// Seeding configuration shared by every process of a group.
///
/// Each process runs an independent Markov chain. The seed handed to the
/// engine on rank `r` is `base + r` with wrapping arithmetic, so two groups
/// started from the same base seed reproduce each other rank by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Base seed supplied by the caller.
    pub base: u64,
}

impl SeedPolicy {
    /// Creates a policy from the caller supplied base seed.
    pub fn new(base: u64) -> Self {
        Self { base }
    }

    /// Seed used by the process with the given rank.
    pub fn for_rank(&self, rank: usize) -> u64 {
        process_seed(self.base, rank)
    }
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Derives the engine seed for a process rank.
pub fn process_seed(base: u64, rank: usize) -> u64 {
    base.wrapping_add(rank as u64)
}
