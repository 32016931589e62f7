//! Ready-made summaries for common routines.
//!
//! Every summary here models a callee entered through `call`: it applies its effect
//! and resumes at the address in `lr`. A symbolic `lr` is reported as an error, which
//! the stepper turns into a hook failure for that path.

use crate::{
    assembly::Register,
    hook::core::Hook,
    state::ExecutionState,
    symbolic::SymExpr,
    Error, Result,
};

fn return_to_caller(state: &mut ExecutionState) -> Result<()> {
    let ret = state.concrete_register(Register::Lr)?;
    state.set_ip(ret);
    Ok(())
}

/// Returns the constant `value` in `r0`.
#[must_use]
pub fn return_value(name: &str, address: u64, value: u64) -> Hook {
    Hook::new(name, address, move |mut state| {
        state.write_register(Register::R0, SymExpr::word(value));
        return_to_caller(&mut state)?;
        Ok(vec![state])
    })
}

/// Returns a fresh unconstrained 64-bit value in `r0`.
///
/// The variable is named `{name}@{step}` so repeated calls along one path stay
/// distinct, and is recorded as a path input.
#[must_use]
pub fn return_symbolic(name: &str, address: u64) -> Hook {
    let prefix = name.to_string();
    Hook::new(name, address, move |mut state| {
        let var_name = format!("{prefix}@{}", state.steps());
        let var = SymExpr::variable(&var_name, 64)?;
        state.write_register(Register::R0, var.clone());
        state.record_input(&var_name, var);
        return_to_caller(&mut state)?;
        Ok(vec![state])
    })
}

/// Ends the path without successors, e.g. for `exit` or `abort`.
#[must_use]
pub fn abort(name: &str, address: u64) -> Hook {
    Hook::new(name, address, |_state| Ok(Vec::new()))
}

/// Returns immediately, leaving every register untouched.
#[must_use]
pub fn skip(name: &str, address: u64) -> Hook {
    Hook::new(name, address, |mut state| {
        return_to_caller(&mut state)?;
        Ok(vec![state])
    })
}

/// Models `read(fd, buf, len)`: copies up to `r2` bytes from stream `fd` to the
/// address in `r1` and returns the count in `r0`.
///
/// Buffer and length must be concrete. A missing stream reads zero bytes.
#[must_use]
pub fn read_stream(name: &str, address: u64, fd: u32) -> Hook {
    Hook::new(name, address, move |mut state| {
        let buffer = state.concrete_register(Register::R1)?;
        let len = usize::try_from(state.concrete_register(Register::R2)?)
            .map_err(|_| Error::Hook("read length does not fit in memory".to_string()))?;

        let bytes = if state.stream(fd).is_some() {
            state.read_stream(fd, len)?
        } else {
            log::debug!("read from unopened fd {fd} returns 0");
            Vec::new()
        };
        for (i, byte) in bytes.iter().enumerate() {
            state
                .memory_mut()
                .write_byte(buffer.wrapping_add(i as u64), byte.clone())?;
        }
        state.write_register(Register::R0, SymExpr::word(bytes.len() as u64));
        return_to_caller(&mut state)?;
        Ok(vec![state])
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{image::Program, state::UninitializedMemory};

    fn called_state() -> Result<ExecutionState> {
        let program = Program::new(0x100).with_code(0x100, vec![0x0C; 0x20])?;
        let mut state = ExecutionState::new(Arc::new(program), UninitializedMemory::Zero);
        state.write_register(Register::Lr, SymExpr::word(0x110));
        state.set_ip(0x200);
        Ok(state)
    }

    #[test]
    fn test_return_value() -> Result<()> {
        let out = return_value("one", 0x200, 1).apply(called_state()?)?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ip(), 0x110);
        assert_eq!(out[0].read_register(Register::R0).as_const(), Some(1));
        Ok(())
    }

    #[test]
    fn test_return_symbolic_records_input() -> Result<()> {
        let out = return_symbolic("rand", 0x200).apply(called_state()?)?;
        let r0 = out[0].read_register(Register::R0);
        assert_eq!(r0.as_var(), Some("rand@0"));
        assert_eq!(out[0].input("rand@0"), Some(&r0));
        Ok(())
    }

    #[test]
    fn test_abort_and_skip() -> Result<()> {
        assert!(abort("exit", 0x200).apply(called_state()?)?.is_empty());

        let mut state = called_state()?;
        state.write_register(Register::R0, SymExpr::word(9));
        let out = skip("noop", 0x200).apply(state)?;
        assert_eq!(out[0].ip(), 0x110);
        assert_eq!(out[0].read_register(Register::R0).as_const(), Some(9));
        Ok(())
    }

    #[test]
    fn test_symbolic_return_address_fails() -> Result<()> {
        let mut state = called_state()?;
        state.make_symbolic_register(Register::Lr, "ret")?;
        assert!(matches!(
            skip("noop", 0x200).apply(state),
            Err(Error::SymbolicValue { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_read_stream() -> Result<()> {
        let mut state = called_state()?;
        let input = state.add_symbolic_stream(0, "stdin", 2)?;
        state.write_register(Register::R1, SymExpr::word(0x800));
        state.write_register(Register::R2, SymExpr::word(4));

        let out = read_stream("read", 0x200, 0).apply(state)?;
        let after = &out[0];
        assert_eq!(after.read_register(Register::R0).as_const(), Some(2));
        assert_eq!(after.read_memory(0x800, 1)?, input[0]);
        assert_eq!(after.read_memory(0x801, 1)?, input[1]);
        assert_eq!(after.stream(0).map(|s| s.remaining()), Some(0));
        Ok(())
    }
}
