// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # symscope
//!
//! A symbolic path-exploration engine for machine code. `symscope` executes a program
//! with some inputs left unknown, splits execution at every branch whose outcome depends
//! on them, and uses an SMT solver to keep only the paths some concrete input can
//! actually take. The result is a set of classified paths, each with concrete witness
//! inputs on demand.
//!
//! ## Features
//!
//! - **Symbolic bit-vectors** - Immutable, shared expression trees with constant folding
//! - **Copy-on-write states** - Forking a path is O(1); forks share registers, memory and history
//! - **Hooks** - Replace any address with a summary closure, checked before decoding
//! - **Cached solving** - Z3 queries behind a digest-keyed, thread-safe result cache
//! - **Pluggable search** - Depth-first, breadth-first and seeded random strategies
//! - **Parallel stepping** - Independent states stepped on a rayon pool, deterministically merged
//! - **State merging** - Fold paths at one address into a single state over a selector
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use symscope::prelude::*;
//!
//! // if (input == 0x41) success(); else fail();
//! let mut asm = ProgramAssembler::new(0x1000);
//! asm.load(Register::R1, 0x2000_u64, 0, 1)
//!     .branch(CmpOp::Eq, Register::R1, 0x41_u64, "success");
//! asm.label("fail")?.halt();
//! asm.label("success")?.halt();
//! let program = asm.finish()?;
//! let success = program.symbol("success").unwrap_or_default();
//! let fail = program.symbol("fail").unwrap_or_default();
//!
//! let mut explorer = Explorer::new(Arc::new(program), HookTable::new(), ExplorationConfig::quick())?;
//! let mut state = explorer.entry_state();
//! let input = state.make_symbolic_memory(0x2000, 1, "input")?;
//! explorer.add_state(state)?;
//!
//! let result = explorer.explore(
//!     &StatePredicate::from(success),
//!     &StatePredicate::from(fail),
//!     &mut DepthFirst,
//! )?;
//! assert_eq!(result.outcome, ExplorationOutcome::Found);
//! assert_eq!(result.witness(explorer.solver(), &input[0])?, 0x41);
//! # Ok::<(), symscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `symscope` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`symbolic`] - Bit-vector expressions and their operators
//! - [`assembly`] - The instruction set, its binary encoding and an assembler
//! - [`image`] - The program image interface and an in-memory implementation
//! - [`state`] - Execution states: registers, memory, streams, constraints, history
//! - [`solver`] - Satisfiability checks and model evaluation through Z3
//! - [`hook`] - Address hooks and built-in summaries
//! - [`engine`] - The instruction stepper
//! - [`explore`] - The exploration scheduler
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Exploration Loop
//!
//! The [`explore::Explorer`] repeatedly picks active states with a
//! [`explore::SearchStrategy`], steps them with the [`engine::Stepper`] and classifies
//! the successors as found, avoided, errored, deadended or still active. Infeasible
//! successors are dropped inside the stepper and never reach a queue.
//!
//! ### Error Model
//!
//! Only configuration and API misuse surface as [`Error`]. Failures of a single path
//! are recorded as an [`engine::ErrorReason`] on that path, and the search continues.
//! Running out of the global budget is an outcome
//! ([`explore::ExplorationOutcome::BudgetExceeded`]), reported distinctly from an
//! exhausted search.

pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use symscope::prelude::*;
///
/// let config = ExplorationConfig::quick().with_max_found(4);
/// assert!(config.validate().is_ok());
/// ```
pub mod prelude;

/// Symbolic bit-vector expressions.
///
/// See [`symbolic::SymExpr`] for construction and simplification rules.
pub mod symbolic;

/// Instruction set, binary encoding and assembler.
///
/// # Key Types
///
/// - [`assembly::Instruction`] - A decoded instruction with its address and length
/// - [`assembly::Opcode`] - The closed set of operations
/// - [`assembly::ProgramAssembler`] - Label-resolving assembler producing [`image::Program`]
pub mod assembly;

/// Program images.
///
/// The [`image::BinaryImage`] trait is everything the engine needs from a loader:
/// decoding, byte reads, the entry point and symbols.
pub mod image;

/// Execution states.
pub mod state;

/// Constraint solving.
pub mod solver;

/// Address hooks and summaries.
pub mod hook;

/// Instruction stepping.
pub mod engine;

/// Exploration scheduling.
pub mod explore;

/// `symscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust
/// use symscope::{symbolic::SymExpr, Result};
///
/// fn checked_byte(value: u64) -> Result<SymExpr> {
///     SymExpr::constant(value, 8)
/// }
/// assert!(checked_byte(0x41).is_ok());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `symscope` Error type
///
/// The main error type for all operations in this crate. Per-path runtime failures are not
/// errors; see [`engine::ErrorReason`].
///
/// # Examples
///
/// ```rust
/// use symscope::{explore::ExplorationConfig, Error};
///
/// match ExplorationConfig::default().with_max_found(0).validate() {
///     Err(Error::InvalidConfig { message }) => println!("bad config: {message}"),
///     Err(e) => println!("Error: {e}"),
///     Ok(()) => unreachable!(),
/// }
/// ```
pub use error::Error;
