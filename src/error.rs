use thiserror::Error;

use crate::{assembly::DecodeError, solver::SolverError};

macro_rules! config_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidConfig {
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidConfig {
            message: format!($fmt, $($arg)*),
        }
    };
}

pub(crate) use config_error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only API misuse and configuration problems surface as an [`Error`]. Conditions that arise
/// while exploring a single path (an undecodable instruction, a solver timeout, an unbounded
/// symbolic pointer) are never raised to the caller; they are recorded against the affected
/// state as an [`crate::engine::ErrorReason`] and the exploration continues.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::InvalidConfig`] - An exploration or solver setting is unusable
/// - [`Error::ContradictoryPredicates`] - An address is both a find and an avoid target
///
/// ## Expression Errors
/// - [`Error::InvalidWidth`] - A bit-width outside `1..=64`
/// - [`Error::WidthMismatch`] - Operands of an operation disagree on their width
/// - [`Error::SymbolicValue`] - A concrete value was required but the expression is symbolic
///
/// ## Program Errors
/// - [`Error::Decode`] - Instruction bytes could not be decoded
/// - [`Error::OutOfBounds`] - A byte cursor ran past the end of its buffer
/// - [`Error::UnknownLabel`] / [`Error::DuplicateLabel`] - Assembler label problems
/// - [`Error::UnknownRegister`] - A register name could not be resolved
///
/// ## Engine Errors
/// - [`Error::Solver`] - The constraint solver failed on a direct query
/// - [`Error::MergeIncompatible`] - States cannot be merged into one
/// - [`Error::Hook`] - A hook summary rejected the state it was given
///
/// # Examples
///
/// ```rust
/// use symscope::{Error, explore::ExplorationConfig};
///
/// let config = ExplorationConfig::default().with_max_found(0);
/// match config.validate() {
///     Err(Error::InvalidConfig { message }) => eprintln!("bad config: {message}"),
///     Err(e) => eprintln!("other error: {e}"),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An exploration, memory or solver configuration value is unusable.
    ///
    /// Raised by [`crate::explore::ExplorationConfig::validate`] and by
    /// [`crate::explore::Explorer::explore`] before any state is stepped.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the offending setting
        message: String,
    },

    /// The same address is listed both as a find target and as an avoid target.
    #[error("Address {address:#x} is both a find and an avoid target")]
    ContradictoryPredicates {
        /// The address present in both predicates
        address: u64,
    },

    /// A bit-width outside the supported range of `1..=64` bits.
    #[error("Invalid bit-width {0}, expected 1..=64")]
    InvalidWidth(u32),

    /// The operands of an operation have incompatible widths.
    #[error("Width mismatch in '{operation}': expected {expected} bits, found {found} bits")]
    WidthMismatch {
        /// The operation being constructed
        operation: &'static str,
        /// Width the operation required
        expected: u32,
        /// Width that was supplied
        found: u32,
    },

    /// A concrete value was required, but the expression is symbolic.
    #[error("Expected a concrete value for {what}, found symbolic expression {expr}")]
    SymbolicValue {
        /// What the value was needed for
        what: &'static str,
        /// The offending expression, pretty printed
        expr: String,
    },

    /// Instruction bytes could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// An out of bound access was attempted while reading encoded bytes.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The assembler was asked to resolve a label that was never defined.
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    /// The assembler was asked to define a label twice.
    #[error("Duplicate label '{0}'")]
    DuplicateLabel(String),

    /// A register name does not exist on the modelled architecture.
    #[error("Unknown register '{0}'")]
    UnknownRegister(String),

    /// The constraint solver failed on a query issued directly by the caller.
    #[error("{0}")]
    Solver(#[from] SolverError),

    /// A set of states cannot be merged into a single state.
    #[error("Cannot merge states: {0}")]
    MergeIncompatible(String),

    /// A hook summary rejected the state it was invoked on.
    #[error("Hook error: {0}")]
    Hook(String),
}
