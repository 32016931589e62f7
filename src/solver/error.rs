use thiserror::Error;

/// Failures of a single solver query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The constraint set has no satisfying assignment.
    ///
    /// Expected while pruning branches; only surfaces when a model was requested for a
    /// set that turned out to be infeasible.
    #[error("Constraint set is unsatisfiable")]
    Unsatisfiable,

    /// The query exceeded its time budget.
    #[error("Solver timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured budget
        timeout_ms: u32,
    },

    /// The decision procedure gave up for another reason.
    #[error("Solver returned unknown: {0}")]
    Unknown(String),
}
