//! Error taxonomy for the simulation engine.

use std::time::Duration;
use thiserror::Error;

/// Faults raised by generators, erosion models and the orchestrator.
///
/// Every variant is caught at the orchestrator boundary: degraded results are
/// logged and returned normally, aborted operations come back as `Err`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("kernel for '{component}' unavailable: {reason}")]
    KernelUnavailable { component: String, reason: String },
    #[error("readback of '{operation}' exceeded {timeout:?}")]
    ReadbackTimeout { operation: &'static str, timeout: Duration },
    #[error("grid size mismatch: expected {expected}, engine has {actual}")]
    GridSizeMismatch { expected: usize, actual: usize },
    #[error("grid size {0} must be a power of two between 2 and {max}", max = crate::grid::MAX_GRID_SIZE)]
    InvalidGridSize(usize),
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
    #[error("worker for '{0}' disconnected before reporting")]
    WorkerLost(&'static str),
    #[error("no terrain has been generated yet")]
    NotGenerated,
    #[error("request was superseded before it completed")]
    Superseded,
}

impl SimError {
    pub(crate) fn kernel(component: &str, reason: impl Into<String>) -> Self {
        Self::KernelUnavailable { component: component.to_string(), reason: reason.into() }
    }
}
