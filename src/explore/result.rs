//! Exploration results.

use std::{collections::HashSet, fmt, time::Duration};

use crate::{
    engine::{ErrorReason, LimitExceeded, StepStats},
    solver::{Solver, SolverError, SolverStats},
    state::ExecutionState,
    symbolic::SymExpr,
    Error, Result,
};

/// Why an exploration returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExplorationOutcome {
    /// The configured number of found states was collected.
    Found,
    /// Every path ended without reaching the find target count. The search was
    /// complete, so unreached targets are unreachable within the per-path bounds.
    Exhausted,
    /// A global budget ran out first. Nothing can be concluded about unvisited paths.
    BudgetExceeded(LimitExceeded),
}

impl ExplorationOutcome {
    /// Checks if the search ended because of a global budget.
    #[must_use]
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, ExplorationOutcome::BudgetExceeded(_))
    }
}

impl fmt::Display for ExplorationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplorationOutcome::Found => f.write_str("found"),
            ExplorationOutcome::Exhausted => f.write_str("exhausted"),
            ExplorationOutcome::BudgetExceeded(limit) => write!(f, "inconclusive ({limit})"),
        }
    }
}

/// A state that could not continue, with the reason.
#[derive(Debug, Clone)]
pub struct ErroredState {
    /// The state as it was when the error occurred.
    pub state: ExecutionState,
    /// What went wrong.
    pub reason: ErrorReason,
}

/// Counters for one exploration run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExplorationStats {
    /// Steps taken across all paths.
    pub steps: u64,
    /// Scheduler iterations.
    pub iterations: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Stepper counters, cumulative over the explorer's lifetime.
    pub stepper: StepStats,
    /// Solver counters, cumulative over the explorer's lifetime.
    pub solver: SolverStats,
}

impl fmt::Display for ExplorationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps in {} iterations ({:?}); {}; {}",
            self.steps, self.iterations, self.elapsed, self.stepper, self.solver
        )
    }
}

/// Classified states of a finished exploration.
///
/// Every state that left the active queue lands in exactly one of `found`,
/// `avoided`, `errored` or `deadended`. States still queued when the search stopped
/// are returned in `active`. Unsatisfiable successors appear nowhere.
#[derive(Debug, Clone)]
pub struct ExplorationResult {
    /// States matching the find predicate.
    pub found: Vec<ExecutionState>,
    /// States matching the avoid predicate.
    pub avoided: Vec<ExecutionState>,
    /// States that hit a runtime error.
    pub errored: Vec<ErroredState>,
    /// States that halted, or crossed a per-path bound or the active cap.
    pub deadended: Vec<ExecutionState>,
    /// States still queued when the search stopped.
    pub active: Vec<ExecutionState>,
    /// Why the search stopped.
    pub outcome: ExplorationOutcome,
    /// Run counters.
    pub stats: ExplorationStats,
}

impl ExplorationResult {
    /// Checks if at least one state was found.
    #[must_use]
    pub fn is_found(&self) -> bool {
        !self.found.is_empty()
    }

    /// Drops found states that agree with an earlier one on `observe`.
    ///
    /// `observe` picks the expression that identifies a witness, typically the input
    /// bytes. A state is a duplicate only when its own constraints pin that expression
    /// to a single value and an earlier pinned state has the same value. States that
    /// still admit several values are always kept. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns the error of `observe`, or [`crate::Error::Solver`] if a found state can
    /// no longer be evaluated.
    pub fn dedup_found<F>(&mut self, solver: &Solver, observe: F) -> Result<usize>
    where
        F: Fn(&ExecutionState) -> Result<SymExpr>,
    {
        let before = self.found.len();
        let mut seen = HashSet::new();
        let mut keep = Vec::with_capacity(before);
        for state in &self.found {
            let witness = observe(state)?;
            let values = solver.evaluate_many(&witness, state.constraints(), 2)?;
            keep.push(match values.as_slice() {
                [pinned] => seen.insert(*pinned),
                _ => true,
            });
        }

        let mut keep = keep.into_iter();
        self.found.retain(|_| keep.next().unwrap_or(true));
        Ok(before - self.found.len())
    }

    /// Concrete value of `expr` on the first found state.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Unsatisfiable`] if nothing was found.
    pub fn witness(&self, solver: &Solver, expr: &SymExpr) -> Result<u64> {
        let state = self
            .found
            .first()
            .ok_or(Error::Solver(SolverError::Unsatisfiable))?;
        Ok(solver.evaluate(expr, state.constraints())?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        assembly::Register,
        image::Program,
        solver::SolverConfig,
        state::UninitializedMemory,
        symbolic::SymbolicOp,
    };

    /// Found states of `x`, one per constraint built by `constrain`.
    fn found(
        bounds: &[u64],
        constrain: fn(&SymExpr, u64) -> Result<SymExpr>,
    ) -> Result<(ExplorationResult, SymExpr)> {
        let image = Arc::new(Program::new(0x100).with_code(0x100, vec![0x0C; 8])?);
        let mut root = ExecutionState::new(image, UninitializedMemory::Zero);
        let x = root.make_symbolic_register(Register::R0, "x")?;

        let mut states = Vec::new();
        for &bound in bounds {
            let mut state = root.fork();
            state.add_constraint(constrain(&x, bound)?)?;
            states.push(state);
        }
        let result = ExplorationResult {
            found: states,
            avoided: Vec::new(),
            errored: Vec::new(),
            deadended: Vec::new(),
            active: Vec::new(),
            outcome: ExplorationOutcome::Exhausted,
            stats: ExplorationStats::default(),
        };
        Ok((result, x))
    }

    #[test]
    fn test_dedup_keeps_unpinned_overlap() -> Result<()> {
        let solver = Solver::new(SolverConfig::default());
        let (mut result, x) = found(&[10, 5], |x, bound| {
            SymExpr::binary(SymbolicOp::LtU, x.clone(), SymExpr::word(bound))
        })?;

        assert_eq!(result.dedup_found(&solver, |_| Ok(x.clone()))?, 0);
        assert_eq!(result.found.len(), 2);
        Ok(())
    }

    #[test]
    fn test_dedup_merges_pinned_values() -> Result<()> {
        let solver = Solver::new(SolverConfig::default());
        let (mut result, x) = found(&[3, 3, 4], |x, value| x.equals(&SymExpr::word(value)))?;

        assert_eq!(result.dedup_found(&solver, |_| Ok(x.clone()))?, 1);
        assert_eq!(result.found.len(), 2);
        assert_eq!(result.witness(&solver, &x)?, 3);
        Ok(())
    }
}
