//! Simulation results.

use crate::ErrorSet;
use serde::Serialize;

/// Outcome of replaying one scenario.
///
/// `detection_ms` is `None` exactly when nothing was detected. Latencies are
/// relative to the triggering event, never wall-clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult<M> {
    /// Whether the attack or fault was detected.
    pub detection: bool,
    /// Detection latency.
    pub detection_ms: Option<u64>,
    /// Recovery or reconciliation latency, where the domain has one.
    pub recovery_ms: Option<u64>,
    /// Raised error categories.
    pub errors: ErrorSet,
    /// Free-form diagnostics.
    pub notes: Vec<String>,
    /// Domain-specific counters and ratios.
    pub metrics: M,
}

impl<M> SimulationResult<M> {
    /// A result with no detection, errors or notes.
    pub fn undetected(metrics: M) -> Self {
        Self {
            detection: false,
            detection_ms: None,
            recovery_ms: None,
            errors: ErrorSet::new(),
            notes: Vec::new(),
            metrics,
        }
    }
}
