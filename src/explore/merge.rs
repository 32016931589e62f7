//! State merging.
//!
//! Merging `n` states at the same address introduces a fresh selector variable `s`
//! and guards `g_i := (s == i)`. Every register and written byte that differs
//! between the inputs becomes an if-then-else chain over the guards, and the
//! constraint sets are combined as
//!
//! ```text
//! common_prefix  AND  OR_i ( g_i AND suffix_i )
//! ```
//!
//! Each disjunct pins the selector to one index, so the merged state is
//! satisfiable exactly when one of its inputs is, and any model of it restricted to
//! the original variables is a model of the input the selector points at.

use std::{collections::BTreeSet, sync::Arc};

use imbl::Vector;

use crate::{
    state::{ConstraintSet, ExecutionState, RegisterFile},
    symbolic::SymExpr,
    Error, Result,
};

/// Width of a selector able to tell `count` states apart.
fn selector_width(count: usize) -> u32 {
    if count <= 2 {
        1
    } else {
        usize::BITS - (count - 1).leading_zeros()
    }
}

/// Folds per-state values into `ite(g_0, v_0, ite(g_1, v_1, ... v_last))`.
///
/// Identical values collapse to a single expression.
fn select(guards: &[SymExpr], values: Vec<SymExpr>) -> Result<SymExpr> {
    let mut iter = values.into_iter().rev();
    let Some(mut merged) = iter.next() else {
        return Err(Error::MergeIncompatible("no values to select".to_string()));
    };

    let last = guards.len() - 1;
    for (offset, value) in iter.enumerate() {
        if value == merged {
            continue;
        }
        merged = SymExpr::ite(guards[last - 1 - offset].clone(), value, merged)?;
    }
    Ok(merged)
}

/// Merges states that share an instruction pointer into one.
///
/// `selector` names the fresh variable that picks among the inputs; it must not occur
/// in any of them. The result is a fork of the first state: it keeps that state's
/// history, takes the longest path length of the group, and carries every named
/// input of every state.
///
/// # Errors
///
/// Returns [`Error::MergeIncompatible`] if `states` is empty, the instruction
/// pointers differ, or the states disagree on their open streams.
pub fn merge_states(states: &[ExecutionState], selector: &str) -> Result<ExecutionState> {
    let Some(first) = states.first() else {
        return Err(Error::MergeIncompatible("no states to merge".to_string()));
    };
    if states.len() == 1 {
        return Ok(first.clone());
    }

    for other in &states[1..] {
        if other.ip() != first.ip() {
            return Err(Error::MergeIncompatible(format!(
                "instruction pointers differ: {:#x} and {:#x}",
                first.ip(),
                other.ip()
            )));
        }
        if !first.streams().eq(other.streams()) {
            return Err(Error::MergeIncompatible(format!(
                "states {} and {} have different input streams",
                first.id(),
                other.id()
            )));
        }
    }

    let width = selector_width(states.len());
    let sel = SymExpr::variable(selector, width)?;
    let guards = (0..states.len() as u64)
        .map(|i| sel.equals(&SymExpr::constant(i, width)?))
        .collect::<Result<Vec<_>>>()?;

    // Constraints
    let prefix = states[1..]
        .iter()
        .map(|s| first.constraints().common_prefix_len(s.constraints()))
        .min()
        .unwrap_or(0);
    let mut constraints =
        ConstraintSet::from_constraints(first.constraints().iter().take(prefix).cloned())?;
    let mut disjunction: Option<SymExpr> = None;
    for (state, guard) in states.iter().zip(&guards) {
        let mut conjunct = guard.clone();
        for constraint in state.constraints().suffix(prefix) {
            conjunct = conjunct.and(&constraint)?;
        }
        disjunction = Some(match disjunction {
            Some(acc) => acc.or(&conjunct)?,
            None => conjunct,
        });
    }
    if let Some(disjunction) = disjunction {
        constraints.push(disjunction)?;
    }

    // Registers
    let mut registers = RegisterFile::new();
    for (reg, _) in first.registers().iter() {
        let values = states.iter().map(|s| s.read_register(reg)).collect();
        registers.set(reg, select(&guards, values)?);
    }

    // Inputs
    let mut inputs: Vector<(Arc<str>, SymExpr)> = first.inputs_raw().clone();
    for state in &states[1..] {
        for (name, value) in state.inputs_raw() {
            if !inputs.iter().any(|(n, _)| n == name) {
                inputs.push_back((name.clone(), value.clone()));
            }
        }
    }

    let steps = states.iter().map(ExecutionState::steps).max().unwrap_or(0);
    let mut merged = first.fork();
    merged.merge_parts(steps, registers, constraints, inputs);

    // Memory
    let written: BTreeSet<u64> = states
        .iter()
        .flat_map(|s| s.memory().written_addresses())
        .collect();
    for address in written {
        let values = states.iter().map(|s| s.memory().read_byte(address)).collect();
        merged
            .memory_mut()
            .write_byte(address, select(&guards, values)?)?;
    }

    log::debug!(
        "merged {} states at {:#x} into state {} with selector {selector}",
        states.len(),
        merged.ip(),
        merged.id()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Register,
        image::Program,
        solver::{Solver, SolverConfig},
        state::UninitializedMemory,
        symbolic::SymbolicOp,
    };

    fn root() -> Result<(ExecutionState, SymExpr)> {
        let image = Arc::new(Program::new(0x100).with_code(0x100, vec![0x0C; 8])?);
        let mut state = ExecutionState::new(image, UninitializedMemory::Zero);
        let x = state.make_symbolic_register(Register::R0, "x")?;
        Ok((state, x))
    }

    /// Two sides of `x < 10`, writing different constants to r1 and memory.
    fn diamond() -> Result<(ExecutionState, ExecutionState, SymExpr)> {
        let (root, x) = root()?;
        let cond = SymExpr::binary(SymbolicOp::LtU, x.clone(), SymExpr::word(10))?;

        let mut taken = root.fork();
        taken.add_constraint(cond.clone())?;
        taken.write_register(Register::R1, SymExpr::word(1));
        taken.write_memory(0x800, &SymExpr::byte(0xAA))?;

        let mut other = root.fork();
        other.add_constraint(cond.not()?)?;
        other.write_register(Register::R1, SymExpr::word(2));
        other.record_step();

        Ok((taken, other, x))
    }

    #[test]
    fn test_selector_width() {
        assert_eq!(selector_width(2), 1);
        assert_eq!(selector_width(3), 2);
        assert_eq!(selector_width(4), 2);
        assert_eq!(selector_width(5), 3);
    }

    #[test]
    fn test_merge_diamond() -> Result<()> {
        let (taken, other, x) = diamond()?;
        let merged = merge_states(&[taken.clone(), other], "sel")?;

        assert_eq!(merged.ip(), taken.ip());
        assert_eq!(merged.steps(), 1);
        assert_eq!(merged.constraints().len(), 1);
        assert_eq!(merged.read_register(Register::R0), x);
        assert!(!merged.read_register(Register::R1).is_const());
        assert!(!merged.read_memory(0x800, 1)?.is_const());

        // r1 is 1 exactly when x < 10, and the memory byte follows the same split
        let solver = Solver::new(SolverConfig::default());
        let mut cs = merged.constraints().clone();
        cs.push(SymExpr::binary(SymbolicOp::LtU, x.clone(), SymExpr::word(10))?)?;
        assert_eq!(solver.evaluate(&merged.read_register(Register::R1), &cs)?, 1);
        assert_eq!(solver.evaluate(&merged.read_memory(0x800, 1)?, &cs)?, 0xAA);

        let mut cs = merged.constraints().clone();
        cs.push(SymExpr::binary(SymbolicOp::GeU, x, SymExpr::word(10))?)?;
        assert_eq!(solver.evaluate(&merged.read_register(Register::R1), &cs)?, 2);
        assert_eq!(solver.evaluate(&merged.read_memory(0x800, 1)?, &cs)?, 0);
        Ok(())
    }

    #[test]
    fn test_merge_three_states_keeps_selector_in_range() -> Result<()> {
        let (root, x) = root()?;
        let states = (0..3_u64)
            .map(|i| {
                let mut s = root.fork();
                s.add_constraint(x.equals(&SymExpr::word(i))?)?;
                s.write_register(Register::R2, SymExpr::word(i * 100));
                Ok(s)
            })
            .collect::<Result<Vec<_>>>()?;

        let merged = merge_states(&states, "sel3")?;
        let solver = Solver::new(SolverConfig::default());
        let mut values = solver.evaluate_many(&x, merged.constraints(), 8)?;
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2]);

        let mut cs = merged.constraints().clone();
        cs.push(x.equals(&SymExpr::word(2))?)?;
        assert_eq!(solver.evaluate(&merged.read_register(Register::R2), &cs)?, 200);
        Ok(())
    }

    #[test]
    fn test_merge_preserves_unsatisfiability() -> Result<()> {
        let (root, x) = root()?;
        let mut a = root.fork();
        a.add_constraint(x.equals(&SymExpr::word(1))?)?;
        a.add_constraint(x.equals(&SymExpr::word(2))?)?;
        let mut b = root.fork();
        b.add_constraint(x.equals(&SymExpr::word(3))?)?;
        b.add_constraint(x.equals(&SymExpr::word(4))?)?;

        let merged = merge_states(&[a, b], "sel")?;
        let solver = Solver::new(SolverConfig::default());
        assert!(!solver.is_satisfiable(merged.constraints())?);
        Ok(())
    }

    #[test]
    fn test_merge_incompatible() -> Result<()> {
        let (root, _) = root()?;
        assert!(matches!(merge_states(&[], "s"), Err(Error::MergeIncompatible(_))));

        let moved = root.fork().with_ip(0x104);
        assert!(matches!(
            merge_states(&[root.clone(), moved], "s"),
            Err(Error::MergeIncompatible(_))
        ));

        let mut with_stream = root.fork();
        with_stream.add_concrete_stream(0, b"hi");
        assert!(matches!(
            merge_states(&[root.clone(), with_stream], "s"),
            Err(Error::MergeIncompatible(_))
        ));

        let single = merge_states(std::slice::from_ref(&root), "s")?;
        assert_eq!(single.id(), root.id());
        Ok(())
    }
}
