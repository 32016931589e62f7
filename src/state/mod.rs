//! Execution states and their components.
//!
//! An [`ExecutionState`] is one path through the program: a register file, a memory
//! model, open input streams, the accumulated path constraints, and path metadata
//! (instruction pointer, step count, visited-address history).
//!
//! # Key Components
//!
//! - [`ExecutionState`] - The per-path snapshot the engine steps
//! - [`RegisterFile`] - Word-sized register slots
//! - [`Memory`] - Sparse byte memory over the program image
//! - [`ConstraintSet`] - Ordered conjunction of path conditions with a canonical digest
//! - [`SymbolicStream`] - Input bytes behind a file descriptor
//! - [`History`] - Visited addresses and per-address visit counts
//!
//! # Copy-on-Write
//!
//! Every component is a persistent structure (`imbl` collections or an `Arc` with
//! `make_mut`). Forking a state clones handles only; the first write on either side
//! copies the touched part, so deep fork trees share most of their data.
//!
//! # Symbolic Addresses
//!
//! Memory is indexed by concrete addresses. Accesses through a symbolic address go
//! through [`ExecutionState::resolve_address`], which enumerates feasible addresses up
//! to a cap and forks once per candidate.

mod constraints;
mod execution;
mod history;
mod memory;
mod registers;
mod streams;

pub use constraints::{ConstraintDigest, ConstraintSet};
pub use execution::ExecutionState;
pub use history::History;
pub use memory::{uninitialized_name, Memory, UninitializedMemory};
pub use registers::{RegisterFile, WORD_BITS};
pub use streams::{stream_byte_name, SymbolicStream};
