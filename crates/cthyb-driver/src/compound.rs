//! Bijection between ordered flavour tuples and the engine's compound
//! component indices.
//!
//! A flavour is `2 * band + spin`. For `k` operators and `N` orbitals the
//! compound index is `1 + Σ_i f_i (2N)^(k-1-i)`, so the first operator is the
//! most significant digit and indices run over `[1, (2N)^k]`.

use cthyb_core::{ErrorInfo, SolverError};
use serde::{Deserialize, Serialize};

use crate::config::OptionValue;

/// A single `(band, spin)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BandSpin {
    /// Orbital index.
    pub band: usize,
    /// Spin index (0 or 1).
    pub spin: usize,
}

impl BandSpin {
    /// Creates a pair.
    pub fn new(band: usize, spin: usize) -> Self {
        Self { band, spin }
    }

    /// Decodes a combined flavour index.
    pub fn from_flavour(flavour: usize) -> Self {
        Self {
            band: flavour / 2,
            spin: flavour % 2,
        }
    }

    /// Combined flavour index with spin running fastest.
    pub fn flavour(&self) -> usize {
        2 * self.band + self.spin
    }
}

/// Caller-supplied component selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentSpec {
    /// Compound index; non-positive entries are ignored.
    Index(i64),
    /// Ordered `(band, spin)` tuple, one entry per operator.
    BandSpin(Vec<BandSpin>),
    /// Ordered combined flavours, one entry per operator.
    Flavours(Vec<usize>),
}

/// Number of compound indices for `n_orb` orbitals and `arity` operators.
pub fn component_count(n_orb: usize, arity: u32) -> Result<u64, SolverError> {
    (n_orb as u64)
        .checked_mul(2)
        .and_then(|base| base.checked_pow(arity))
        .ok_or_else(|| {
            SolverError::Configuration(
                ErrorInfo::new("component-count", "number of compound indices overflows u64")
                    .with_context("n_orb", n_orb.to_string())
                    .with_context("arity", arity.to_string()),
            )
        })
}

/// Decodes a compound index into its ordered `(band, spin)` pairs.
pub fn index_to_component(n_orb: usize, arity: u32, index: u64) -> Result<Vec<BandSpin>, SolverError> {
    check_index(n_orb, arity, index)?;
    let base = 2 * n_orb as u64;
    let mut remainder = index - 1;
    let mut digits = vec![0usize; arity as usize];
    for slot in digits.iter_mut().rev() {
        *slot = (remainder % base) as usize;
        remainder /= base;
    }
    Ok(digits.into_iter().map(BandSpin::from_flavour).collect())
}

/// Encodes ordered flavours into a compound index.
pub fn flavours_to_index(n_orb: usize, flavours: &[usize]) -> Result<u64, SolverError> {
    let base = 2 * n_orb;
    let mut index = 0u64;
    for &flavour in flavours {
        if flavour >= base {
            return Err(SolverError::Configuration(
                ErrorInfo::new("flavour-range", "flavour exceeds 2 * n_orb")
                    .with_context("flavour", flavour.to_string())
                    .with_context("n_orb", n_orb.to_string()),
            ));
        }
        index = index * base as u64 + flavour as u64;
    }
    Ok(index + 1)
}

/// Encodes ordered `(band, spin)` pairs into a compound index.
pub fn component_to_index(n_orb: usize, pairs: &[BandSpin]) -> Result<u64, SolverError> {
    if let Some(bad) = pairs.iter().find(|pair| pair.spin > 1 || pair.band >= n_orb) {
        return Err(SolverError::Configuration(
            ErrorInfo::new("band-spin-range", "band or spin out of range")
                .with_context("band", bad.band.to_string())
                .with_context("spin", bad.spin.to_string()),
        ));
    }
    let flavours: Vec<usize> = pairs.iter().map(BandSpin::flavour).collect();
    flavours_to_index(n_orb, &flavours)
}

fn check_index(n_orb: usize, arity: u32, index: u64) -> Result<(), SolverError> {
    let count = component_count(n_orb, arity)?;
    if index == 0 || index > count {
        return Err(SolverError::Configuration(
            ErrorInfo::new("component-range", "compound index out of range")
                .with_context("index", index.to_string())
                .with_context("max", count.to_string()),
        ));
    }
    Ok(())
}

impl ComponentSpec {
    /// Resolves the selection to a compound index.
    ///
    /// Returns `Ok(None)` for non-positive explicit indices, which are skipped.
    pub fn resolve(&self, n_orb: usize, arity: u32) -> Result<Option<u64>, SolverError> {
        let index = match self {
            ComponentSpec::Index(raw) if *raw <= 0 => return Ok(None),
            ComponentSpec::Index(raw) => *raw as u64,
            ComponentSpec::BandSpin(pairs) => {
                check_arity(pairs.len(), arity)?;
                component_to_index(n_orb, pairs)?
            }
            ComponentSpec::Flavours(flavours) => {
                check_arity(flavours.len(), arity)?;
                flavours_to_index(n_orb, flavours)?
            }
        };
        check_index(n_orb, arity, index)?;
        Ok(Some(index))
    }

    /// Parses an entry of the raw `WormComponents` engine option.
    ///
    /// Integers are compound indices; lists hold either combined flavours or
    /// `[band, spin]` pairs.
    pub fn from_option(value: &OptionValue) -> Result<Self, SolverError> {
        let invalid = || {
            SolverError::Configuration(
                ErrorInfo::new("worm-components", "cannot interpret WormComponents entry")
                    .with_context("entry", value.to_string()),
            )
        };
        match value {
            OptionValue::List(entries) => {
                if entries.iter().all(|entry| matches!(entry, OptionValue::List(_))) {
                    let pairs = entries
                        .iter()
                        .map(|entry| match entry {
                            OptionValue::List(pair) if pair.len() == 2 => {
                                let band = pair[0].as_i64().filter(|v| *v >= 0);
                                let spin = pair[1].as_i64().filter(|v| *v >= 0);
                                match (band, spin) {
                                    (Some(band), Some(spin)) => {
                                        Ok(BandSpin::new(band as usize, spin as usize))
                                    }
                                    _ => Err(invalid()),
                                }
                            }
                            _ => Err(invalid()),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(ComponentSpec::BandSpin(pairs))
                } else {
                    let flavours = entries
                        .iter()
                        .map(|entry| {
                            entry
                                .as_i64()
                                .filter(|v| *v >= 0)
                                .map(|v| v as usize)
                                .ok_or_else(invalid)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(ComponentSpec::Flavours(flavours))
                }
            }
            other => other.as_i64().map(ComponentSpec::Index).ok_or_else(invalid),
        }
    }
}

fn check_arity(len: usize, arity: u32) -> Result<(), SolverError> {
    if len != arity as usize {
        return Err(SolverError::Configuration(
            ErrorInfo::new("component-arity", "component tuple has the wrong length")
                .with_context("expected", arity.to_string())
                .with_context("found", len.to_string()),
        ));
    }
    Ok(())
}
