use sha2::{Digest, Sha256};

use cthyb_core::{ErrorInfo, SolverError};

use crate::config::EngineConfiguration;

/// Content hash of an engine configuration.
///
/// Sections and keys are hashed in insertion order, so two processes that
/// translated the same options produce the same fingerprint.
pub fn config_fingerprint(config: &EngineConfiguration) -> Result<String, SolverError> {
    let payload = serde_json::to_vec(config)
        .map_err(|err| SolverError::Serde(ErrorInfo::new("config-fingerprint", err.to_string())))?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint of a configuration with the per-component budget applied.
pub fn invocation_fingerprint(
    config: &EngineConfiguration,
    seed: u64,
    component: Option<u64>,
) -> Result<String, SolverError> {
    let payload = serde_json::to_vec(config)
        .map_err(|err| SolverError::Serde(ErrorInfo::new("invocation-fingerprint", err.to_string())))?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    hasher.update(seed.to_le_bytes());
    if let Some(component) = component {
        hasher.update(component.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}
