//! Per-state failure reasons.

use thiserror::Error;

use crate::{assembly::DecodeError, solver::SolverError};

/// Why a state was classified as errored.
///
/// These are runtime conditions local to one path. They are recorded against the
/// state and never abort an exploration; only configuration problems surface as
/// [`crate::Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorReason {
    /// The bytes at the instruction pointer do not form a valid instruction.
    #[error("Decode failure: {0}")]
    DecodeFailure(DecodeError),

    /// The instruction pointer left every executable region.
    #[error("Instruction pointer {address:#x} is outside any code region")]
    InvalidInstructionPointer {
        /// The offending address
        address: u64,
    },

    /// A symbolic address or jump target admits more values than the enumeration cap.
    #[error("Symbolic address {address} has more than {cap} feasible values")]
    UnconstrainedMemoryAccess {
        /// Printed form of the address expression
        address: String,
        /// The configured cap
        cap: usize,
    },

    /// A solver query on this path ran out of time.
    #[error("Solver timed out")]
    SolverTimeout,

    /// The solver could not decide a query on this path.
    #[error("Solver returned unknown: {0}")]
    SolverUnknown(String),

    /// A hook summary returned an error.
    #[error("Hook '{hook}' failed: {message}")]
    HookFailure {
        /// Name of the hook
        hook: String,
        /// The error it reported
        message: String,
    },

    /// Instruction semantics could not be applied, e.g. a symbolic value where a
    /// constant is required.
    #[error("Execution fault: {0}")]
    ExecutionFault(String),
}

impl ErrorReason {
    /// Maps a solver failure to a state error.
    ///
    /// Returns `None` for [`SolverError::Unsatisfiable`], which means the path is
    /// infeasible and must be dropped rather than reported.
    #[must_use]
    pub fn from_solver(error: &SolverError) -> Option<Self> {
        match error {
            SolverError::Unsatisfiable => None,
            SolverError::Timeout { .. } => Some(ErrorReason::SolverTimeout),
            SolverError::Unknown(reason) => Some(ErrorReason::SolverUnknown(reason.clone())),
        }
    }
}

impl From<DecodeError> for ErrorReason {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::OutsideCode { address } => {
                ErrorReason::InvalidInstructionPointer { address }
            }
            other => ErrorReason::DecodeFailure(other),
        }
    }
}
