//! # symscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the symscope library. Import this module to get quick access to the essential
//! types for setting up and running an exploration.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all symscope operations
pub use crate::Error;

/// The result type used throughout symscope
pub use crate::Result;

// ================================================================================================
// Symbolic Values
// ================================================================================================

/// Expressions and operators
pub use crate::symbolic::{ExprKind, SymExpr, SymbolicOp};

// ================================================================================================
// Programs
// ================================================================================================

/// Instruction set and assembler
pub use crate::assembly::{AluOp, CmpOp, Instruction, Opcode, Operand, ProgramAssembler, Register};

/// Program images
pub use crate::image::{BinaryImage, Program};

// ================================================================================================
// Execution States
// ================================================================================================

/// Per-path state and its components
pub use crate::state::{ConstraintSet, ExecutionState, UninitializedMemory};

// ================================================================================================
// Solver
// ================================================================================================

/// Satisfiability checks and model evaluation
pub use crate::solver::{Solver, SolverConfig, SolverError, SolverStats};

// ================================================================================================
// Hooks and Stepping
// ================================================================================================

/// Hooks, the hook table and built-in summaries
pub use crate::hook::{summaries, Hook, HookTable};

/// The instruction stepper and its results
pub use crate::engine::{ErrorReason, StepResult, Stepper, Successor};

// ================================================================================================
// Exploration
// ================================================================================================

/// The scheduler, its configuration and strategies
pub use crate::explore::{
    BreadthFirst, DepthFirst, ExplorationConfig, ExplorationLimits, ExplorationOutcome,
    ExplorationResult, Explorer, MemoryConfig, Random, SearchStrategy, StatePredicate,
};
