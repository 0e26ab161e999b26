//! Error taxonomy for the simulation engine
//!
//! Every variant is fatal for the run that raised it: the engine has no
//! external I/O that could fail transiently, so nothing is retried.

use thiserror::Error;

/// Top-level error type for simulation operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Rejected configuration, raised at construction and never mid-run.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An event was scheduled before the current virtual time.
    #[error("causality violation: cannot schedule at t={requested} when the clock reads t={now}")]
    Causality { now: f64, requested: f64 },

    /// A process broke the acquire/release protocol, or was resumed in a
    /// state it cannot be resumed from.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}
