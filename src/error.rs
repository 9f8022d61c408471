//! Error types for the teb-planner library
//!
//! This module provides the main error and result types used throughout the
//! library. All errors use the `thiserror` crate for automatic trait
//! implementations.
//!
//! Recoverable conditions (optimization disabled by configuration, the inner
//! solver making no progress) are reported as `Ok(false)` from the planner
//! entry points together with a log line; the variants below cover the
//! failures that abort the current planning cycle.

use thiserror::Error;

/// Main result type used throughout the teb-planner library
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Main error type for the teb-planner library
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    /// An entry point was called before the planner was configured
    #[error("Planner is not initialized: call initialize() first")]
    NotInitialized,

    /// Invalid input parameters (empty plan, singleton plan, non-positive time difference)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Graph build was requested while the previous graph was still populated.
    /// Indicates a missing `clear` on a prior code path.
    #[error("Cannot build graph: the graph is not empty, call clear first")]
    GraphNotEmpty,

    /// The inner solver completed zero iterations
    #[error("Solver failed: no iterations completed")]
    SolverFailed,

    /// Trajectory extraction requested with fewer than 2 poses
    #[error("No trajectory available: the band contains fewer than 2 poses")]
    NoTrajectory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PlannerError::InvalidInput("plan has a single pose".to_string());
        assert_eq!(error.to_string(), "Invalid input: plan has a single pose");
    }

    #[test]
    fn test_graph_not_empty_display() {
        let error = PlannerError::GraphNotEmpty;
        assert!(error.to_string().contains("not empty"));
    }

    #[test]
    fn test_result_alias() {
        let ok: PlannerResult<u32> = Ok(7);
        assert!(ok.is_ok());
        let err: PlannerResult<u32> = Err(PlannerError::NoTrajectory);
        assert!(err.is_err());
    }
}
