//! Instruction stepper and per-step result types.
//!
//! This module turns one [`crate::state::ExecutionState`] into its successors. It
//! knows the semantics of every [`crate::assembly::Opcode`] and nothing about
//! scheduling; the explorer decides which state to step next and how to classify
//! what comes back.
//!
//! # Key Components
//!
//! - [`Stepper`] - Hook check, decode and execute for one state
//! - [`StepResult`] / [`Successor`] - Active, exited and errored successors
//! - [`ErrorReason`] - Why a state could not continue
//! - [`ExecutionStats`] / [`LimitExceeded`] - Global budget tracking
//!
//! # Outcome Shapes
//!
//! | Instruction | Successors |
//! |-------------|------------|
//! | straight-line, concrete load/store | one |
//! | symbolic load/store address | one per feasible address, up to the cap |
//! | jump/call/ret with symbolic target | one per feasible target, up to the cap |
//! | branch on a symbolic condition | up to two, each checked with the solver |
//! | `halt` | one exited |
//! | hook | whatever the summary returns |

mod error;
mod result;
mod stats;
mod stepper;

pub use error::ErrorReason;
pub use result::{StepResult, Successor};
pub use stats::{ExecutionStats, LimitExceeded, StepStats};
pub use stepper::Stepper;
