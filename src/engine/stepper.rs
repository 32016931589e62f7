//! Single-step symbolic execution.

use std::sync::Arc;

use crate::{
    assembly::{Instruction, Opcode, Operand, Register},
    engine::{
        stats::{StepCounters, StepStats},
        ErrorReason, StepResult, Successor,
    },
    hook::{Hook, HookTable},
    image::BinaryImage,
    solver::Solver,
    state::ExecutionState,
    symbolic::{SymExpr, SymbolicOp},
};

type ExecResult = std::result::Result<StepResult, ErrorReason>;

fn fault(error: &crate::Error) -> ErrorReason {
    ErrorReason::ExecutionFault(error.to_string())
}

/// Advances one state by one instruction or one hook application.
///
/// Each step runs the same sequence: count the step and record the address in the
/// path history, apply the hook registered at the instruction pointer if there is
/// one, otherwise decode the instruction from the state's image and apply its
/// effect. Successors of data-dependent branches are checked with the solver and
/// only feasible ones are emitted.
///
/// The stepper holds no per-state data, so one instance can step many states in
/// parallel.
///
/// # Examples
///
/// ```rust,ignore
/// use symscope::prelude::*;
///
/// let stepper = Stepper::new(Arc::new(HookTable::new()), Arc::new(Solver::new(SolverConfig::default())), 8);
/// let result = stepper.step(state);
/// for successor in result.successors {
///     match successor {
///         Successor::Active(next) => queue.push(next),
///         Successor::Exited(done) => finished.push(done),
///         Successor::Errored { state, reason } => log::debug!("{}: {reason}", state.id()),
///     }
/// }
/// ```
pub struct Stepper {
    hooks: Arc<HookTable>,
    solver: Arc<Solver>,
    address_cap: usize,
    counters: StepCounters,
}

impl Stepper {
    /// Creates a stepper.
    ///
    /// `address_cap` bounds how many concrete values a symbolic memory address or
    /// jump target may take before the state is errored.
    #[must_use]
    pub fn new(hooks: Arc<HookTable>, solver: Arc<Solver>, address_cap: usize) -> Self {
        Stepper {
            hooks,
            solver,
            address_cap,
            counters: StepCounters::default(),
        }
    }

    /// The hook table consulted before every decode.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookTable> {
        &self.hooks
    }

    /// The solver used for feasibility checks.
    #[must_use]
    pub fn solver(&self) -> &Arc<Solver> {
        &self.solver
    }

    /// The symbolic address enumeration cap.
    #[must_use]
    pub fn address_cap(&self) -> usize {
        self.address_cap
    }

    /// Counters accumulated over every step so far.
    #[must_use]
    pub fn stats(&self) -> StepStats {
        self.counters.snapshot()
    }

    /// Steps `state` once.
    ///
    /// Never fails: decode errors, bad instruction pointers, solver timeouts and hook
    /// errors come back as [`Successor::Errored`].
    pub fn step(&self, mut state: ExecutionState) -> StepResult {
        state.record_step();

        if let Some(hook) = self.hooks.lookup(state.ip()) {
            return self.apply_hook(hook, state);
        }

        let instruction = match state.memory().image().decode(state.ip()) {
            Ok(instruction) => instruction,
            Err(error) => {
                let reason = ErrorReason::from(error);
                log::debug!("state {} errored at {:#x}: {reason}", state.id(), state.ip());
                StepCounters::bump(&self.counters.errors, 1);
                return StepResult::errored(state, reason);
            }
        };
        StepCounters::bump(&self.counters.instructions, 1);
        log::trace!("state {}: {instruction}", state.id());

        let origin = state.clone();
        let result = match self.execute(state, &instruction) {
            Ok(result) => result,
            Err(reason) => StepResult::errored(origin, reason),
        };
        self.account(&result);
        result
    }

    fn account(&self, result: &StepResult) {
        let errors = result
            .successors
            .iter()
            .filter(|s| matches!(s, Successor::Errored { .. }))
            .count();
        StepCounters::bump(&self.counters.errors, errors as u64);
        StepCounters::bump(&self.counters.infeasible, result.pruned as u64);
        if result.successors.len() > 1 {
            StepCounters::bump(&self.counters.forks, (result.successors.len() - 1) as u64);
        }
    }

    fn apply_hook(&self, hook: &Hook, state: ExecutionState) -> StepResult {
        StepCounters::bump(&self.counters.hooks, 1);
        log::trace!("state {} hooked by '{}' at {:#x}", state.id(), hook.name(), hook.address());

        let digest = state.constraints().digest();
        let origin = state.clone();
        let mut result = StepResult {
            hooked: true,
            ..StepResult::default()
        };
        match hook.apply(state) {
            Ok(states) => {
                for next in states {
                    // Summaries that leave the constraints alone cannot make a path infeasible
                    if next.constraints().digest() == digest {
                        result.successors.push(Successor::Active(next));
                    } else {
                        self.admit(next, &mut result);
                    }
                }
            }
            Err(error) => {
                let reason = ErrorReason::HookFailure {
                    hook: hook.name().to_string(),
                    message: error.to_string(),
                };
                log::debug!("state {} errored: {reason}", origin.id());
                result.successors.push(Successor::Errored {
                    state: origin,
                    reason,
                });
            }
        }
        self.account(&result);
        result
    }

    /// Queues `state` if its constraints are satisfiable.
    fn admit(&self, state: ExecutionState, result: &mut StepResult) {
        match self.solver.is_satisfiable(state.constraints()) {
            Ok(true) => result.successors.push(Successor::Active(state)),
            Ok(false) => {
                log::trace!("pruned infeasible state {} at {:#x}", state.id(), state.ip());
                result.pruned += 1;
            }
            Err(error) => match ErrorReason::from_solver(&error) {
                Some(reason) => {
                    log::debug!("state {} errored at {:#x}: {reason}", state.id(), state.ip());
                    result.successors.push(Successor::Errored { state, reason });
                }
                None => result.pruned += 1,
            },
        }
    }

    fn execute(&self, mut state: ExecutionState, instruction: &Instruction) -> ExecResult {
        let next = instruction.fallthrough();

        match instruction.opcode {
            Opcode::Nop => {}
            Opcode::Mov { dst, src } => {
                let value = operand(&state, src);
                state.write_register(dst, value);
            }
            Opcode::Alu { op, dst, lhs, rhs } => {
                let value = SymExpr::binary(
                    op.symbolic_op(),
                    state.read_register(lhs),
                    operand(&state, rhs),
                )
                .map_err(|e| fault(&e))?;
                state.write_register(dst, value);
            }
            Opcode::Not { dst, src } => {
                let value = SymExpr::unary(SymbolicOp::Not, state.read_register(src))
                    .map_err(|e| fault(&e))?;
                state.write_register(dst, value);
            }
            Opcode::Neg { dst, src } => {
                let value = SymExpr::unary(SymbolicOp::Neg, state.read_register(src))
                    .map_err(|e| fault(&e))?;
                state.write_register(dst, value);
            }
            Opcode::SetCond {
                cond,
                dst,
                lhs,
                rhs,
            } => {
                let flag = SymExpr::binary(
                    cond.symbolic_op(),
                    state.read_register(lhs),
                    operand(&state, rhs),
                )
                .map_err(|e| fault(&e))?;
                state.write_register(dst, flag);
            }
            Opcode::Load {
                dst,
                base,
                offset,
                size,
            } => {
                let address = effective_address(&state, base, offset)?;
                let loaded = state.read_memory_symbolic(
                    &address,
                    size,
                    &self.solver,
                    self.address_cap,
                )?;
                return Ok(self.emit(loaded.into_iter().map(|(mut s, value)| {
                    s.write_register(dst, value);
                    s.set_ip(next);
                    s
                })));
            }
            Opcode::Store {
                src,
                base,
                offset,
                size,
            } => {
                let address = effective_address(&state, base, offset)?;
                let mut value = operand(&state, src);
                if size < 8 {
                    value = SymExpr::extract(u32::from(size) * 8 - 1, 0, value)
                        .map_err(|e| fault(&e))?;
                }
                let stored = state.write_memory_symbolic(
                    &address,
                    &value,
                    &self.solver,
                    self.address_cap,
                )?;
                return Ok(self.emit(stored.into_iter().map(|mut s| {
                    s.set_ip(next);
                    s
                })));
            }
            Opcode::Jump { target } => {
                let target = operand(&state, target);
                return self.transfer(state, &target);
            }
            Opcode::Branch {
                cond,
                lhs,
                rhs,
                target,
            } => {
                let condition = SymExpr::binary(
                    cond.symbolic_op(),
                    state.read_register(lhs),
                    operand(&state, rhs),
                )
                .map_err(|e| fault(&e))?;
                return self.branch(state, &condition, target, next);
            }
            Opcode::Call { target } => {
                let target = operand(&state, target);
                state.write_register(Register::Lr, SymExpr::word(next));
                return self.transfer(state, &target);
            }
            Opcode::Ret => {
                let target = state.read_register(Register::Lr);
                return self.transfer(state, &target);
            }
            Opcode::Halt => {
                log::debug!("state {} exited at {:#x}", state.id(), state.ip());
                return Ok(StepResult::single(Successor::Exited(state)));
            }
        }

        state.set_ip(next);
        Ok(StepResult::single(Successor::Active(state)))
    }

    /// Emits successors that are feasible by construction.
    fn emit(&self, states: impl Iterator<Item = ExecutionState>) -> StepResult {
        let mut result = StepResult {
            successors: states.map(Successor::Active).collect(),
            ..StepResult::default()
        };
        if result.successors.is_empty() {
            result.pruned = 1;
        }
        result
    }

    /// Moves to a possibly symbolic target, forking once per feasible value.
    fn transfer(&self, mut state: ExecutionState, target: &SymExpr) -> ExecResult {
        if let Some(address) = target.as_const() {
            state.set_ip(address);
            return Ok(StepResult::single(Successor::Active(state)));
        }
        let candidates = state.resolve_address(target, &self.solver, self.address_cap)?;
        if candidates.len() > 1 {
            log::trace!(
                "state {} forked {} ways on jump target {target}",
                state.id(),
                candidates.len()
            );
        }
        Ok(self.emit(candidates.into_iter().map(|(mut s, address)| {
            s.set_ip(address);
            s
        })))
    }

    /// Forks on a 1-bit condition: taken side first, then the fallthrough.
    fn branch(
        &self,
        state: ExecutionState,
        condition: &SymExpr,
        taken: u64,
        fallthrough: u64,
    ) -> ExecResult {
        if let Some(value) = condition.as_const() {
            let target = if value == 1 { taken } else { fallthrough };
            return Ok(StepResult::single(Successor::Active(state.with_ip(target))));
        }

        let negated = condition.not().map_err(|e| fault(&e))?;
        let mut result = StepResult::default();
        for (assumption, target) in [(condition.clone(), taken), (negated, fallthrough)] {
            let mut side = state.fork();
            side.add_constraint(assumption).map_err(|e| fault(&e))?;
            side.set_ip(target);
            self.admit(side, &mut result);
        }
        if result.successors.len() > 1 {
            log::trace!("state {} forked at {:#x} on {condition}", state.id(), state.ip());
        }
        Ok(result)
    }
}

impl std::fmt::Debug for Stepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stepper")
            .field("hooks", &self.hooks.len())
            .field("address_cap", &self.address_cap)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn operand(state: &ExecutionState, operand: Operand) -> SymExpr {
    match operand {
        Operand::Reg(reg) => state.read_register(reg),
        Operand::Imm(value) => SymExpr::word(value),
    }
}

fn effective_address(
    state: &ExecutionState,
    base: Operand,
    offset: i32,
) -> std::result::Result<SymExpr, ErrorReason> {
    let base = operand(state, base);
    SymExpr::binary(SymbolicOp::Add, base, SymExpr::word(i64::from(offset) as u64))
        .map_err(|e| fault(&e))
}
