//! The exploration scheduler.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use rayon::prelude::*;

use crate::{
    engine::{ExecutionStats, StepResult, StepStats, Stepper, Successor},
    explore::{
        config::ExplorationConfig,
        merge::merge_states,
        predicate::StatePredicate,
        result::{ErroredState, ExplorationOutcome, ExplorationResult, ExplorationStats},
        strategy::SearchStrategy,
    },
    hook::HookTable,
    image::BinaryImage,
    solver::Solver,
    state::ExecutionState,
    symbolic::SymExpr,
    Error, Result,
};

/// Terminal queues filled during one call to [`Explorer::explore`].
#[derive(Default)]
struct Classified {
    found: Vec<ExecutionState>,
    avoided: Vec<ExecutionState>,
    errored: Vec<ErroredState>,
    deadended: Vec<ExecutionState>,
}

/// Drives a population of execution states towards a find predicate.
///
/// The explorer owns the active queue. Each iteration asks a [`SearchStrategy`] which
/// states to step, steps them with the shared [`Stepper`], and sorts every successor
/// into found, avoided, errored, deadended or back into the active queue. The global
/// budget is checked once per iteration; a step in progress always completes.
///
/// States still active when [`Explorer::explore`] returns stay queued, so a search
/// that ran out of budget can be resumed by calling it again.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use symscope::assembly::{CmpOp, ProgramAssembler, Register};
/// use symscope::explore::{DepthFirst, ExplorationConfig, Explorer, StatePredicate};
/// use symscope::hook::HookTable;
/// use symscope::image::BinaryImage;
///
/// let mut asm = ProgramAssembler::new(0x1000);
/// asm.branch(CmpOp::Eq, Register::R0, 0x41_u64, "success").halt();
/// asm.label("success")?.halt();
/// let program = asm.finish()?;
/// let success = program.symbol("success").unwrap_or_default();
///
/// let mut explorer = Explorer::new(Arc::new(program), HookTable::new(), ExplorationConfig::quick())?;
/// let mut state = explorer.entry_state();
/// let input = state.make_symbolic_register(Register::R0, "input")?;
/// explorer.add_state(state)?;
///
/// let result = explorer.explore(&StatePredicate::from(success), &StatePredicate::Never, &mut DepthFirst)?;
/// assert_eq!(result.witness(explorer.solver(), &input)?, 0x41);
/// # Ok::<(), symscope::Error>(())
/// ```
pub struct Explorer {
    image: Arc<dyn BinaryImage>,
    config: ExplorationConfig,
    solver: Arc<Solver>,
    stepper: Stepper,
    active: VecDeque<ExecutionState>,
    global: Vec<SymExpr>,
    merges: u64,
}

impl Explorer {
    /// Creates an explorer over `image` with a fixed hook table.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if `config` does not validate.
    pub fn new(
        image: Arc<dyn BinaryImage>,
        hooks: impl Into<Arc<HookTable>>,
        config: ExplorationConfig,
    ) -> Result<Self> {
        config.validate()?;

        let solver = Arc::new(Solver::new(config.solver.clone()));
        let stepper = Stepper::new(
            hooks.into(),
            Arc::clone(&solver),
            config.memory.symbolic_address_cap,
        );
        Ok(Explorer {
            image,
            config,
            solver,
            stepper,
            active: VecDeque::new(),
            global: Vec::new(),
            merges: 0,
        })
    }

    /// A fresh state at the image entry point, not yet queued.
    #[must_use]
    pub fn entry_state(&self) -> ExecutionState {
        ExecutionState::new(Arc::clone(&self.image), self.config.memory.uninitialized)
    }

    /// Queues `state` for exploration, adding every global constraint asserted so far.
    ///
    /// # Errors
    ///
    /// Never fails for constraints accepted by [`Explorer::assert_global`].
    pub fn add_state(&mut self, mut state: ExecutionState) -> Result<()> {
        for constraint in &self.global {
            if !state.constraints().contains(constraint) {
                state.add_constraint(constraint.clone())?;
            }
        }
        self.active.push_back(state);
        Ok(())
    }

    /// States waiting to be stepped, oldest first.
    #[must_use]
    pub fn active(&self) -> &VecDeque<ExecutionState> {
        &self.active
    }

    /// The configuration this explorer was built with.
    #[must_use]
    pub fn config(&self) -> &ExplorationConfig {
        &self.config
    }

    /// The solver shared by the stepper and the scheduler.
    #[must_use]
    pub fn solver(&self) -> &Arc<Solver> {
        &self.solver
    }

    /// Stepper counters accumulated over the explorer's lifetime.
    #[must_use]
    pub fn step_stats(&self) -> StepStats {
        self.stepper.stats()
    }

    /// Asserts a fact on every active state and on every state queued later.
    ///
    /// Satisfiability is not rechecked; call [`Explorer::prune`] afterwards to drop the
    /// states the fact rules out.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::WidthMismatch`] if `constraint` is not 1 bit wide.
    pub fn assert_global(&mut self, constraint: SymExpr) -> Result<()> {
        if constraint.width() != 1 {
            return Err(Error::WidthMismatch {
                operation: "assert_global",
                expected: 1,
                found: constraint.width(),
            });
        }
        for state in &mut self.active {
            state.add_constraint(constraint.clone())?;
        }
        self.global.push(constraint);
        Ok(())
    }

    /// Drops active states whose constraints became unsatisfiable.
    ///
    /// Checks run in parallel. A state the solver cannot decide in time is kept.
    /// Returns the number of states removed.
    pub fn prune(&mut self) -> usize {
        let solver = &self.solver;
        let keep: Vec<bool> = self
            .active
            .par_iter()
            .map(|state| match solver.is_satisfiable(state.constraints()) {
                Ok(sat) => sat,
                Err(err) => {
                    log::debug!("keeping state {} during prune: {err}", state.id());
                    true
                }
            })
            .collect();

        let before = self.active.len();
        let mut keep = keep.into_iter();
        self.active.retain(|_| keep.next().unwrap_or(true));
        let removed = before - self.active.len();
        if removed > 0 {
            log::debug!("pruned {removed} infeasible states");
        }
        removed
    }

    /// Merges active states that share an instruction pointer.
    ///
    /// Groups keep the order of their first member in the queue. Groups whose members
    /// cannot be merged, e.g. because their input streams differ, stay as they are.
    /// Returns how many states were folded away.
    pub fn merge_active(&mut self) -> usize {
        let mut groups: Vec<Vec<ExecutionState>> = Vec::new();
        let mut by_ip: HashMap<u64, usize> = HashMap::new();
        for state in self.active.drain(..) {
            let slot = *by_ip.entry(state.ip()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(state);
        }

        let mut folded = 0;
        for group in groups {
            if group.len() < 2 {
                self.active.extend(group);
                continue;
            }

            let selector = format!("merge_sel_{}", self.merges);
            match merge_states(&group, &selector) {
                Ok(merged) => {
                    self.merges += 1;
                    folded += group.len() - 1;
                    self.active.push_back(merged);
                }
                Err(err) => {
                    log::debug!("not merging {} states: {err}", group.len());
                    self.active.extend(group);
                }
            }
        }
        folded
    }

    /// Runs the search until enough states are found, every path has ended, or a
    /// global budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ContradictoryPredicates`] if `find` and `avoid` name a
    /// common address. Runtime failures of individual paths are never returned as
    /// errors; they are classified in the result.
    pub fn explore(
        &mut self,
        find: &StatePredicate,
        avoid: &StatePredicate,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<ExplorationResult> {
        StatePredicate::check_disjoint(find, avoid)?;

        let limits = self.config.limits.clone();
        let mut stats = ExecutionStats::new();
        let mut iterations = 0_u64;
        let mut queues = Classified::default();
        stats.start();

        log::info!(
            "exploring {} states with {} strategy",
            self.active.len(),
            strategy.name()
        );

        let outcome = loop {
            if queues.found.len() >= limits.max_found {
                break ExplorationOutcome::Found;
            }
            if self.active.is_empty() {
                break ExplorationOutcome::Exhausted;
            }
            if let Some(limit) = stats.check_limits(&limits) {
                break ExplorationOutcome::BudgetExceeded(limit);
            }
            iterations += 1;

            let batch = self.select_batch(strategy);
            stats.add_steps(batch.len() as u64);
            for result in self.step_batch(batch) {
                for successor in result.successors {
                    self.classify(successor, find, avoid, &mut queues);
                }
            }
            self.enforce_active_cap(strategy, &mut queues.deadended);
        };

        let stats = ExplorationStats {
            steps: stats.steps_executed,
            iterations,
            elapsed: stats.elapsed().unwrap_or_default(),
            stepper: self.stepper.stats(),
            solver: self.solver.stats(),
        };
        log::info!(
            "exploration {outcome}: {} found, {} avoided, {} errored, {} deadended, {} active",
            queues.found.len(),
            queues.avoided.len(),
            queues.errored.len(),
            queues.deadended.len(),
            self.active.len()
        );
        log::debug!("{stats}");

        Ok(ExplorationResult {
            found: queues.found,
            avoided: queues.avoided,
            errored: queues.errored,
            deadended: queues.deadended,
            active: self.active.iter().cloned().collect(),
            outcome,
            stats,
        })
    }

    fn select_batch(&mut self, strategy: &mut dyn SearchStrategy) -> Vec<ExecutionState> {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        while batch.len() < self.config.batch_size {
            let Some(state) = strategy
                .select(&self.active)
                .and_then(|index| self.active.remove(index))
            else {
                break;
            };
            batch.push(state);
        }
        batch
    }

    fn step_batch(&self, batch: Vec<ExecutionState>) -> Vec<StepResult> {
        let stepper = &self.stepper;
        if batch.len() == 1 {
            batch.into_iter().map(|state| stepper.step(state)).collect()
        } else {
            batch
                .into_par_iter()
                .map(|state| stepper.step(state))
                .collect()
        }
    }

    fn classify(
        &mut self,
        successor: Successor,
        find: &StatePredicate,
        avoid: &StatePredicate,
        queues: &mut Classified,
    ) {
        let limits = &self.config.limits;
        let (state, exited) = match successor {
            Successor::Errored { state, reason } => {
                log::debug!("state {} errored at {:#x}: {reason}", state.id(), state.ip());
                queues.errored.push(ErroredState { state, reason });
                return;
            }
            Successor::Exited(state) => (state, true),
            Successor::Active(state) => (state, false),
        };

        if avoid.matches(&state) {
            log::debug!("state {} avoided at {:#x}", state.id(), state.ip());
            queues.avoided.push(state);
        } else if find.matches(&state) {
            log::debug!("state {} found at {:#x}", state.id(), state.ip());
            queues.found.push(state);
        } else if exited {
            log::debug!("state {} halted at {:#x}", state.id(), state.ip());
            queues.deadended.push(state);
        } else if limits.max_path_steps != 0 && state.steps() >= limits.max_path_steps {
            log::debug!(
                "state {} deadended after {} steps",
                state.id(),
                state.steps()
            );
            queues.deadended.push(state);
        } else if limits
            .loop_unroll_limit
            .is_some_and(|limit| state.history().visits(state.ip()) >= limit)
        {
            log::debug!(
                "state {} deadended at {:#x}: loop unroll limit",
                state.id(),
                state.ip()
            );
            queues.deadended.push(state);
        } else {
            log::trace!("state {} queued at {:#x}", state.id(), state.ip());
            self.active.push_back(state);
        }
    }

    fn enforce_active_cap(
        &mut self,
        strategy: &mut dyn SearchStrategy,
        deadended: &mut Vec<ExecutionState>,
    ) {
        let Some(cap) = self.config.limits.max_active else {
            return;
        };
        while self.active.len() > cap {
            let Some(state) = strategy
                .evict(&self.active)
                .and_then(|index| self.active.remove(index))
            else {
                break;
            };
            log::debug!("state {} dropped over active cap {cap}", state.id());
            deadended.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Register,
        engine::{ErrorReason, LimitExceeded},
        explore::{BreadthFirst, DepthFirst, Random},
        symbolic::SymbolicOp,
        test::{self, programs},
    };

    fn explorer(program: crate::image::Program, config: ExplorationConfig) -> Result<Explorer> {
        test::init_logging();
        Explorer::new(Arc::new(program), HookTable::new(), config)
    }

    #[test]
    fn test_finds_matching_input() -> Result<()> {
        let program = programs::check_byte(0x41)?;
        let success = programs::symbol(&program, "success")?;
        let fail = programs::symbol(&program, "fail")?;
        let mut explorer = explorer(program, ExplorationConfig::quick())?;

        let mut state = explorer.entry_state();
        let input = state.make_symbolic_memory(programs::INPUT, 1, "input")?;
        explorer.add_state(state)?;

        let result = explorer.explore(
            &StatePredicate::from(success),
            &StatePredicate::from(fail),
            &mut BreadthFirst,
        )?;
        assert_eq!(result.outcome, ExplorationOutcome::Found);
        assert_eq!(result.found.len(), 1);
        assert_eq!(result.avoided.len(), 1);
        assert_eq!(result.witness(explorer.solver(), &input[0])?, 0x41);
        Ok(())
    }

    #[test]
    fn test_contradictory_predicates() -> Result<()> {
        let program = programs::check_byte(0x41)?;
        let success = programs::symbol(&program, "success")?;
        let mut explorer = explorer(program, ExplorationConfig::quick())?;

        let find = StatePredicate::from(success);
        assert!(matches!(
            explorer.explore(&find, &find.clone(), &mut DepthFirst),
            Err(Error::ContradictoryPredicates { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() -> Result<()> {
        let program = programs::check_byte(0x41)?;
        let config = ExplorationConfig::default().with_max_found(0);
        assert!(matches!(
            Explorer::new(Arc::new(program), HookTable::new(), config),
            Err(Error::InvalidConfig { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_path_bound_deadends_loop() -> Result<()> {
        let mut explorer = explorer(programs::infinite_loop()?, ExplorationConfig::bounded(100))?;
        explorer.add_state(explorer.entry_state())?;

        let result = explorer.explore(&StatePredicate::Never, &StatePredicate::Never, &mut DepthFirst)?;
        assert_eq!(result.outcome, ExplorationOutcome::Exhausted);
        assert!(result.found.is_empty());
        assert!(result.active.is_empty());
        assert_eq!(result.deadended.len(), 1);
        assert_eq!(result.deadended[0].steps(), 100);
        assert_eq!(result.stats.steps, 100);
        Ok(())
    }

    #[test]
    fn test_unroll_limit_deadends_loop() -> Result<()> {
        let config = ExplorationConfig::bounded(0).with_loop_unroll_limit(Some(5));
        let mut explorer = explorer(programs::infinite_loop()?, config)?;
        explorer.add_state(explorer.entry_state())?;

        let result = explorer.explore(&StatePredicate::Never, &StatePredicate::Never, &mut DepthFirst)?;
        assert_eq!(result.deadended.len(), 1);
        assert_eq!(result.deadended[0].history().max_visits(), 5);
        Ok(())
    }

    #[test]
    fn test_global_budget_is_inconclusive() -> Result<()> {
        let config = ExplorationConfig::bounded(0)
            .with_max_total_steps(50)
            .with_loop_unroll_limit(None);
        let mut explorer = explorer(programs::infinite_loop()?, config)?;
        explorer.add_state(explorer.entry_state())?;

        let result = explorer.explore(&StatePredicate::Never, &StatePredicate::Never, &mut DepthFirst)?;
        assert!(result.outcome.is_inconclusive());
        assert_eq!(
            result.outcome,
            ExplorationOutcome::BudgetExceeded(LimitExceeded::Steps {
                executed: 50,
                limit: 50
            })
        );
        assert_eq!(result.active.len(), 1);
        assert_eq!(explorer.active().len(), 1);
        Ok(())
    }

    #[test]
    fn test_errored_states_do_not_stop_exploration() -> Result<()> {
        let program = programs::bad_opcode_on_one_side()?;
        let done = programs::symbol(&program, "done")?;
        let mut explorer = explorer(program, ExplorationConfig::quick())?;
        let mut state = explorer.entry_state();
        state.make_symbolic_register(Register::R0, "x")?;
        explorer.add_state(state)?;

        let result = explorer.explore(&StatePredicate::from(done), &StatePredicate::Never, &mut BreadthFirst)?;
        assert_eq!(result.found.len(), 1);
        assert_eq!(result.errored.len(), 1);
        assert!(matches!(
            result.errored[0].reason,
            ErrorReason::DecodeFailure(_)
        ));
        Ok(())
    }

    #[test]
    fn test_max_found_collects_several() -> Result<()> {
        let program = programs::branch_ladder(3)?;
        let config = ExplorationConfig::quick().with_max_found(4);
        let mut explorer = explorer(program, config)?;
        let mut state = explorer.entry_state();
        state.make_symbolic_register(Register::R0, "x")?;
        explorer.add_state(state)?;

        let halted = StatePredicate::custom(|s| {
            s.memory()
                .image()
                .decode(s.ip())
                .is_ok_and(|insn| insn.opcode.mnemonic() == "halt")
        });
        let result = explorer.explore(&halted, &StatePredicate::Never, &mut DepthFirst)?;
        assert_eq!(result.found.len(), 4);
        assert_eq!(result.outcome, ExplorationOutcome::Found);
        Ok(())
    }

    #[test]
    fn test_max_active_evicts() -> Result<()> {
        let program = programs::branch_ladder(4)?;
        let config = ExplorationConfig::quick().with_max_active(Some(2));
        let mut explorer = explorer(program, config)?;
        let mut state = explorer.entry_state();
        state.make_symbolic_register(Register::R0, "x")?;
        explorer.add_state(state)?;

        let result = explorer.explore(&StatePredicate::Never, &StatePredicate::Never, &mut BreadthFirst)?;
        assert_eq!(result.outcome, ExplorationOutcome::Exhausted);
        assert!(result.deadended.len() >= 3);
        Ok(())
    }

    #[test]
    fn test_prune_after_global_assertion() -> Result<()> {
        let program = programs::check_byte(0x41)?;
        let mut explorer = explorer(program, ExplorationConfig::quick())?;

        let mut low = explorer.entry_state();
        let x = low.make_symbolic_register(Register::R5, "x")?;
        low.add_constraint(SymExpr::binary(SymbolicOp::LtU, x.clone(), SymExpr::word(10))?)?;
        let mut high = explorer.entry_state();
        high.make_symbolic_register(Register::R5, "x")?;
        high.add_constraint(SymExpr::binary(SymbolicOp::GeU, x.clone(), SymExpr::word(10))?)?;
        explorer.add_state(low)?;
        explorer.add_state(high)?;

        explorer.assert_global(x.equals(&SymExpr::word(3))?)?;
        assert_eq!(explorer.prune(), 1);
        assert_eq!(explorer.active().len(), 1);

        // Later states inherit the fact
        explorer.add_state(explorer.entry_state())?;
        assert_eq!(explorer.active()[1].constraints().len(), 1);
        assert!(explorer.assert_global(SymExpr::word(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_merge_active_folds_same_ip() -> Result<()> {
        let program = programs::check_byte(0x41)?;
        let mut explorer = explorer(program, ExplorationConfig::quick())?;
        let mut root = explorer.entry_state();
        let x = root.make_symbolic_register(Register::R5, "x")?;
        for i in 0..3_u64 {
            let mut s = root.fork();
            s.add_constraint(x.equals(&SymExpr::word(i))?)?;
            explorer.add_state(s)?;
        }
        explorer.add_state(root.fork().with_ip(0x9000))?;

        assert_eq!(explorer.merge_active(), 2);
        assert_eq!(explorer.active().len(), 2);
        assert_eq!(explorer.active()[0].ip(), root.ip());
        assert_eq!(explorer.active()[1].ip(), 0x9000);
        Ok(())
    }

    #[test]
    fn test_batches_match_sequential() -> Result<()> {
        let run = |batch_size: usize| -> Result<Vec<u64>> {
            let config = ExplorationConfig::quick()
                .with_batch_size(batch_size)
                .with_max_found(usize::MAX);
            let mut explorer = explorer(programs::branch_ladder(3)?, config)?;
            let mut state = explorer.entry_state();
            state.make_symbolic_register(Register::R0, "x")?;
            explorer.add_state(state)?;
            let result = explorer.explore(
                &StatePredicate::Never,
                &StatePredicate::Never,
                &mut BreadthFirst,
            )?;
            Ok(result.deadended.iter().map(ExecutionState::steps).collect())
        };

        let sequential = run(1)?;
        assert_eq!(sequential.len(), 8);
        assert_eq!(sequential, run(1)?);

        let mut batched = run(4)?;
        let mut expected = sequential.clone();
        batched.sort_unstable();
        expected.sort_unstable();
        assert_eq!(batched, expected);
        Ok(())
    }

    #[test]
    fn test_random_strategy_is_deterministic() -> Result<()> {
        let run = || -> Result<Vec<u64>> {
            let config = ExplorationConfig::quick().with_max_found(usize::MAX);
            let mut explorer = explorer(programs::branch_ladder(3)?, config)?;
            let mut state = explorer.entry_state();
            state.make_symbolic_register(Register::R0, "x")?;
            explorer.add_state(state)?;
            let result = explorer.explore(
                &StatePredicate::Never,
                &StatePredicate::Never,
                &mut Random::new(11),
            )?;
            Ok(result.deadended.iter().map(ExecutionState::steps).collect())
        };
        assert_eq!(run()?, run()?);
        Ok(())
    }
}
