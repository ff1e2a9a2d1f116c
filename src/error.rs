//! Error taxonomy for the execution subsystem.
//!
//! Runtime failures of submitted code are deliberately *not* represented
//! here: they travel in-band as `ExecutionOutcome` data so the correction
//! loop can consume them. `ExecError` covers everything the loop has no
//! basis to retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// Failure reaching or completing the execution backend itself
    /// (interpreter would not start, transport refused, harness crashed).
    /// Never attributable to the submitted code; never auto-retried.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// A referenced dataset id is absent from the cache.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// Invalid capacity or setup parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Stable machine-readable tag, used in wire-level error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::Infrastructure(_) => "infrastructure",
            ExecError::NotFound(_) => "not_found",
            ExecError::Config(_) => "config",
            ExecError::Io(_) => "io",
        }
    }
}
