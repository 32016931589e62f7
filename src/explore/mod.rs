//! Exploration scheduler.
//!
//! The scheduler owns the population of execution states and decides which path to
//! advance next. It steps states through the [`crate::engine::Stepper`], classifies
//! their successors, and stops on success, exhaustion, or an exhausted global budget.
//!
//! # Key Components
//!
//! - [`Explorer`] - Active queue, classification and the main loop
//! - [`SearchStrategy`] - Pluggable selection ([`DepthFirst`], [`BreadthFirst`], [`Random`])
//! - [`StatePredicate`] - Find and avoid conditions
//! - [`ExplorationConfig`] - Budgets, bounds, memory and solver settings
//! - [`ExplorationResult`] - Classified states and run statistics
//! - [`merge_states`] - Folds states at one address into a single state
//!
//! # Classification
//!
//! Successors are classified in this order; the first matching rule wins:
//!
//! | Rule | Queue |
//! |------|-------|
//! | stepping failed | `errored` |
//! | avoid predicate matches | `avoided` |
//! | find predicate matches | `found` |
//! | executed `halt` | `deadended` |
//! | path step bound or loop unroll limit reached | `deadended` |
//! | otherwise | `active` |
//!
//! Unsatisfiable successors never reach the scheduler; the stepper drops them.
//!
//! # Outcomes
//!
//! [`ExplorationOutcome::Exhausted`] means every path was followed to its end or to a
//! per-path bound. [`ExplorationOutcome::BudgetExceeded`] means the global step or
//! time budget ran out first, so the absence of found states proves nothing.

mod config;
mod explorer;
mod merge;
mod predicate;
mod result;
mod strategy;

pub use config::{ExplorationConfig, ExplorationLimits, MemoryConfig};
pub use explorer::Explorer;
pub use merge::merge_states;
pub use predicate::{PredicateFn, StatePredicate};
pub use result::{ErroredState, ExplorationOutcome, ExplorationResult, ExplorationStats};
pub use strategy::{BreadthFirst, DepthFirst, Random, SearchStrategy};
