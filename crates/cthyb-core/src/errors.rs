//! Structured error types shared across the solve orchestrator crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SolverError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (option names, shapes, components, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for a solve call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SolverError {
    /// Incompatible or incomplete solve options.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// Shape or orbital-count mismatch between problem tensors or engine outputs.
    #[error("consistency error: {0}")]
    Consistency(ErrorInfo),
    /// Worm measurement toggles that do not resolve to a supported sector.
    #[error("unimplemented sector: {0}")]
    UnimplementedSector(ErrorInfo),
    /// The external engine failed; never retried.
    #[error("engine failure: {0}")]
    Engine(ErrorInfo),
    /// Hard stop raised before any engine invocation (complex and worm mode together).
    #[error("fatal: {0}")]
    Fatal(ErrorInfo),
    /// Serialization and input file errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl SolverError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SolverError::Configuration(info)
            | SolverError::Consistency(info)
            | SolverError::UnimplementedSector(info)
            | SolverError::Engine(info)
            | SolverError::Fatal(info)
            | SolverError::Serde(info) => info,
        }
    }

    /// Whether the error demands an immediate stop instead of ordinary propagation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SolverError::Fatal(_))
    }

    /// Shorthand for a configuration error.
    pub fn configuration(code: &str, message: impl Into<String>) -> Self {
        SolverError::Configuration(ErrorInfo::new(code, message))
    }

    /// Shorthand for a consistency error.
    pub fn consistency(code: &str, message: impl Into<String>) -> Self {
        SolverError::Consistency(ErrorInfo::new(code, message))
    }

    /// Shorthand for an engine failure.
    pub fn engine(code: &str, message: impl Into<String>) -> Self {
        SolverError::Engine(ErrorInfo::new(code, message))
    }
}
