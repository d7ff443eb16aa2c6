use cthyb_core::{ErrorInfo, SolverError};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfiguration, ResolvedConfig, WORM_TOGGLES};

/// Measurement pipeline executed by a solve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSector {
    /// Standard sector, imaginary-time Green's function.
    StandardTau,
    /// Standard sector, Legendre coefficients only.
    Legendre,
    /// Standard sector, perturbation-order histogram only.
    PerturbationOrder,
    /// One-particle worm sector sampled component by component.
    WormTwoOperator,
    /// Full two-particle Green's function in Matsubara frequencies.
    WormFourOperatorFull,
    /// Three-leg particle-hole susceptibility in two frequencies.
    WormP3iwPH,
    /// Two-leg particle-hole susceptibility in Matsubara frequencies.
    WormP2iwPH,
    /// Two-leg particle-hole susceptibility in imaginary time.
    WormP2tauPH,
}

impl MeasurementSector {
    /// Stable label used in logs and plans.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementSector::StandardTau => "standard-tau",
            MeasurementSector::Legendre => "legendre",
            MeasurementSector::PerturbationOrder => "perturbation-order",
            MeasurementSector::WormTwoOperator => "worm-two-operator",
            MeasurementSector::WormFourOperatorFull => "worm-four-operator",
            MeasurementSector::WormP3iwPH => "worm-p3iw-ph",
            MeasurementSector::WormP2iwPH => "worm-p2iw-ph",
            MeasurementSector::WormP2tauPH => "worm-p2tau-ph",
        }
    }

    /// Whether the sector runs a single standard invocation.
    pub fn is_standard(&self) -> bool {
        matches!(
            self,
            MeasurementSector::StandardTau
                | MeasurementSector::Legendre
                | MeasurementSector::PerturbationOrder
        )
    }

    /// Whether the sector samples one component per engine invocation.
    pub fn is_component_resolved(&self) -> bool {
        !self.is_standard()
    }
}

impl std::fmt::Display for MeasurementSector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worm sectors as numbered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WormSector {
    /// Partition function (no worm measurement).
    PartitionFunction,
    /// One-particle Green's function.
    GreenFunction,
    /// Improved-estimator one-particle function.
    GSigma,
    /// Two-particle Green's function.
    TwoParticle,
    /// Improved-estimator two-particle function.
    H4,
    /// Two-leg particle-hole susceptibility.
    P2ParticleHole,
    /// Two-leg particle-particle susceptibility.
    P2ParticleParticle,
    /// Three-leg particle-hole susceptibility.
    P3ParticleHole,
    /// Three-leg particle-particle susceptibility.
    P3ParticleParticle,
}

impl WormSector {
    /// Engine sector number.
    pub fn number(&self) -> u32 {
        match self {
            WormSector::PartitionFunction => 1,
            WormSector::GreenFunction => 2,
            WormSector::GSigma => 3,
            WormSector::TwoParticle => 4,
            WormSector::H4 => 5,
            WormSector::P2ParticleHole => 6,
            WormSector::P2ParticleParticle => 7,
            WormSector::P3ParticleHole => 8,
            WormSector::P3ParticleParticle => 9,
        }
    }

    /// Sector the engine samples for the given toggles; the first active toggle wins.
    pub fn from_config(config: &EngineConfiguration) -> Self {
        let any = |keys: &[&str]| keys.iter().any(|key| config.qmc_flag(key));
        if any(&["WormMeasGiw", "WormMeasGtau"]) {
            WormSector::GreenFunction
        } else if any(&["WormMeasGSigmaiw"]) {
            WormSector::GSigma
        } else if any(&["WormMeasG4iw", "WormMeasG4tau"]) {
            WormSector::TwoParticle
        } else if any(&["WormMeasH4iw"]) {
            WormSector::H4
        } else if any(&["WormMeasP2iwPH", "WormMeasP2tauPH"]) {
            WormSector::P2ParticleHole
        } else if any(&["WormMeasP2iwPP", "WormMeasP2tauPP"]) {
            WormSector::P2ParticleParticle
        } else if any(&["WormMeasP3iwPH"]) {
            WormSector::P3ParticleHole
        } else if any(&["WormMeasP3iwPP"]) {
            WormSector::P3ParticleParticle
        } else {
            WormSector::PartitionFunction
        }
    }
}

const REDUCED_TOGGLES: [(&str, MeasurementSector); 3] = [
    ("WormMeasP3iwPH", MeasurementSector::WormP3iwPH),
    ("WormMeasP2iwPH", MeasurementSector::WormP2iwPH),
    ("WormMeasP2tauPH", MeasurementSector::WormP2tauPH),
];

fn standard_sector(resolved: &ResolvedConfig) -> Result<MeasurementSector, SolverError> {
    let measurements = &resolved.measurements;
    if measurements.g_tau {
        Ok(MeasurementSector::StandardTau)
    } else if measurements.g_l {
        Ok(MeasurementSector::Legendre)
    } else if measurements.pert_order {
        Ok(MeasurementSector::PerturbationOrder)
    } else {
        Err(SolverError::configuration(
            "no-observable",
            "no standard-sector observable was requested",
        ))
    }
}

/// Selects the measurement pipeline from the resolved configuration.
///
/// Rules are evaluated in order and the first match wins.
pub fn select(resolved: &ResolvedConfig) -> Result<MeasurementSector, SolverError> {
    let engine = &resolved.engine;
    if resolved.complex || !resolved.worm {
        return standard_sector(resolved);
    }
    if WormSector::from_config(engine) == WormSector::GreenFunction {
        return Ok(MeasurementSector::WormTwoOperator);
    }
    if engine.qmc_int("FourPnt") == 8 {
        return Ok(MeasurementSector::WormFourOperatorFull);
    }
    let reduced: Vec<_> = REDUCED_TOGGLES
        .iter()
        .filter(|(key, _)| engine.qmc_flag(key))
        .collect();
    match reduced.as_slice() {
        [(_, sector)] => return Ok(*sector),
        [] => {}
        several => {
            let keys: Vec<&str> = several.iter().map(|(key, _)| *key).collect();
            return Err(SolverError::UnimplementedSector(
                ErrorInfo::new(
                    "ambiguous-reduced-sector",
                    "more than one reduced two-particle worm measurement is enabled",
                )
                .with_context("toggles", keys.join(",")),
            ));
        }
    }
    let active: Vec<&str> = WORM_TOGGLES
        .iter()
        .copied()
        .filter(|key| engine.qmc_flag(key))
        .collect();
    if active.is_empty() {
        let measurements = &resolved.measurements;
        if measurements.g_l {
            return Ok(MeasurementSector::Legendre);
        }
        if measurements.pert_order {
            return Ok(MeasurementSector::PerturbationOrder);
        }
    }
    Err(SolverError::UnimplementedSector(
        ErrorInfo::new(
            "unrecognised-worm-sector",
            "worm sampling is enabled but no supported worm measurement matches",
        )
        .with_context("toggles", active.join(","))
        .with_context("four_pnt", engine.qmc_int("FourPnt").to_string()),
    ))
}
