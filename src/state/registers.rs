//! Register file.

use std::sync::Arc;

use strum::EnumCount;

use crate::{assembly::Register, symbolic::SymExpr};

/// Width of every register in bits.
pub const WORD_BITS: u32 = 64;

/// Fixed set of register slots, shared between forks until one of them writes.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    slots: Arc<[SymExpr; Register::COUNT]>,
}

impl RegisterFile {
    /// Creates a register file with every slot set to zero.
    #[must_use]
    pub fn new() -> Self {
        RegisterFile {
            slots: Arc::new(std::array::from_fn(|_| SymExpr::word(0))),
        }
    }

    /// Current value of `reg`.
    #[must_use]
    pub fn get(&self, reg: Register) -> &SymExpr {
        &self.slots[reg.index()]
    }

    /// Replaces the value of `reg`, zero-extending narrower values to the word width.
    pub fn set(&mut self, reg: Register, value: SymExpr) {
        let value = if value.width() < WORD_BITS {
            SymExpr::zero_extend(value.clone(), WORD_BITS).unwrap_or(value)
        } else {
            value
        };
        Arc::make_mut(&mut self.slots)[reg.index()] = value;
    }

    /// Iterates over all registers and their values.
    pub fn iter(&self) -> impl Iterator<Item = (Register, &SymExpr)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((Register::from_repr(u8::try_from(i).ok()?)?, v)))
    }

    pub(crate) fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    #[test]
    fn test_defaults_to_zero() {
        let regs = RegisterFile::new();
        assert!(regs.iter().all(|(_, v)| v.as_const() == Some(0)));
        assert_eq!(regs.iter().count(), Register::COUNT);
    }

    #[test]
    fn test_narrow_values_are_extended() -> Result<()> {
        let mut regs = RegisterFile::new();
        regs.set(Register::R1, SymExpr::variable("b", 8)?);
        assert_eq!(regs.get(Register::R1).width(), WORD_BITS);
        Ok(())
    }

    #[test]
    fn test_copy_on_write() {
        let mut a = RegisterFile::new();
        let b = a.clone();
        assert!(a.shares_storage(&b));

        a.set(Register::R0, SymExpr::word(7));
        assert!(!a.shares_storage(&b));
        assert_eq!(a.get(Register::R0).as_const(), Some(7));
        assert_eq!(b.get(Register::R0).as_const(), Some(0));
    }
}
