//! Constraint solver adapter.
//!
//! Wraps the Z3 SMT solver behind three questions the engine asks about a path:
//! is its constraint set satisfiable, what is one concrete value of an expression
//! under it, and which distinct values can an expression take.
//!
//! # Key Components
//!
//! - [`Solver`] - Query front end with fast paths, caching and timeouts
//! - [`SolverConfig`] - Per-query time budget and cache settings
//! - [`SolverError`] - Unsatisfiable, timed out, or undecided queries
//! - [`SolverStats`] - Query counters
//!
//! # Fast Paths
//!
//! Sets containing a constant `0` are unsatisfiable and sets of only constants are
//! satisfiable without touching the backend; evaluating a constant expression only
//! needs the satisfiability answer.
//!
//! # Timeouts
//!
//! A timed-out query is neither a yes nor a no. The engine records the affected
//! state as errored with a solver-timeout reason rather than pruning it.

mod cache;
mod config;
mod error;
mod query;
mod translate;

pub use cache::SolverStats;
pub use config::SolverConfig;
pub use error::SolverError;
pub use query::Solver;
