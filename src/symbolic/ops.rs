//! Symbolic operation types.
//!
//! This module defines [`SymbolicOp`], the set of operations supported in
//! symbolic expressions, together with [`fold_unary`] and [`fold_binary`],
//! the concrete semantics used for constant folding and model checking.
//!
//! Operations are categorized as:
//! - **Arithmetic**: Add, Sub, Mul, Div, Rem, Neg
//! - **Bitwise**: And, Or, Xor, Not, Shl, Shr
//! - **Comparison**: Eq, Ne, Lt, Gt, Le, Ge (with signed/unsigned variants)
//!
//! All arithmetic wraps modulo `2^width`. Division and remainder by zero follow
//! the SMT-LIB bit-vector rules so that folding a constant and asking the solver
//! about the same expression always agree.

use std::fmt;

/// A symbolic operation in an expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolicOp {
    // Arithmetic operations
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Signed division.
    DivS,
    /// Unsigned division.
    DivU,
    /// Signed remainder (sign follows the dividend).
    RemS,
    /// Unsigned remainder.
    RemU,
    /// Two's-complement negation.
    Neg,

    // Bitwise operations
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Bitwise NOT.
    Not,
    /// Shift left.
    Shl,
    /// Arithmetic shift right (preserves sign).
    ShrS,
    /// Logical shift right (zero-fill).
    ShrU,

    // Comparison operations (1-bit result)
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Signed less than.
    LtS,
    /// Unsigned less than.
    LtU,
    /// Signed greater than.
    GtS,
    /// Unsigned greater than.
    GtU,
    /// Signed less than or equal.
    LeS,
    /// Unsigned less than or equal.
    LeU,
    /// Signed greater than or equal.
    GeS,
    /// Unsigned greater than or equal.
    GeU,
}

impl SymbolicOp {
    /// Checks if this operation is commutative.
    ///
    /// # Returns
    ///
    /// `true` if the operation is commutative (Add, Mul, And, Or, Xor, Eq, Ne).
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor | Self::Eq | Self::Ne
        )
    }

    /// Checks if this operation is a comparison.
    ///
    /// Comparisons always produce a 1-bit result regardless of operand width.
    ///
    /// # Returns
    ///
    /// `true` if this is a comparison operation (Eq, Ne, Lt*, Gt*, Le*, Ge*).
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Ne
                | Self::LtS
                | Self::LtU
                | Self::GtS
                | Self::GtU
                | Self::LeS
                | Self::LeU
                | Self::GeS
                | Self::GeU
        )
    }

    /// Checks if this is a unary operation.
    ///
    /// # Returns
    ///
    /// `true` if this is a unary operation (Neg, Not).
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::Neg | Self::Not)
    }

    /// Returns the comparison that holds exactly when this one does not.
    ///
    /// # Returns
    ///
    /// `Some(op)` for comparisons, `None` for every other operation.
    #[must_use]
    pub const fn negated_comparison(self) -> Option<Self> {
        Some(match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::LtS => Self::GeS,
            Self::LtU => Self::GeU,
            Self::GtS => Self::LeS,
            Self::GtU => Self::LeU,
            Self::LeS => Self::GtS,
            Self::LeU => Self::GtU,
            Self::GeS => Self::LtS,
            Self::GeU => Self::LtU,
            _ => return None,
        })
    }

    /// Short, stable name used in diagnostics and width errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::DivS => "sdiv",
            Self::DivU => "udiv",
            Self::RemS => "srem",
            Self::RemU => "urem",
            Self::Neg => "neg",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Shl => "shl",
            Self::ShrS => "ashr",
            Self::ShrU => "lshr",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::LtS => "slt",
            Self::LtU => "ult",
            Self::GtS => "sgt",
            Self::GtU => "ugt",
            Self::LeS => "sle",
            Self::LeU => "ule",
            Self::GeS => "sge",
            Self::GeU => "uge",
        }
    }
}

impl fmt::Display for SymbolicOp {
    #[allow(clippy::match_same_arms)] // Sub and Neg are semantically different (binary vs unary)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::DivS => write!(f, "/"),
            Self::DivU => write!(f, "/u"),
            Self::RemS => write!(f, "%"),
            Self::RemU => write!(f, "%u"),
            Self::Neg => write!(f, "-"),
            Self::And => write!(f, "&"),
            Self::Or => write!(f, "|"),
            Self::Xor => write!(f, "^"),
            Self::Not => write!(f, "~"),
            Self::Shl => write!(f, "<<"),
            Self::ShrS => write!(f, ">>"),
            Self::ShrU => write!(f, ">>>"),
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
            Self::LtS => write!(f, "<"),
            Self::LtU => write!(f, "<u"),
            Self::GtS => write!(f, ">"),
            Self::GtU => write!(f, ">u"),
            Self::LeS => write!(f, "<="),
            Self::LeU => write!(f, "<=u"),
            Self::GeS => write!(f, ">="),
            Self::GeU => write!(f, ">=u"),
        }
    }
}

/// Returns the bit mask covering the low `width` bits.
#[must_use]
pub const fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Interprets the low `width` bits of `value` as a two's-complement integer.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn to_signed(value: u64, width: u32) -> i64 {
    if width >= 64 {
        value as i64
    } else {
        let shift = 64 - width;
        ((value << shift) as i64) >> shift
    }
}

/// Applies a unary operation to a concrete value of the given width.
///
/// # Returns
///
/// The masked result, or `None` if `op` is not unary.
#[must_use]
pub fn fold_unary(op: SymbolicOp, value: u64, width: u32) -> Option<u64> {
    let m = mask(width);
    match op {
        SymbolicOp::Neg => Some(value.wrapping_neg() & m),
        SymbolicOp::Not => Some(!value & m),
        _ => None,
    }
}

/// Applies a binary operation to two concrete values of the given operand width.
///
/// Comparisons return `0` or `1`. Every other result is masked to `width` bits.
///
/// # Returns
///
/// The result, or `None` if `op` is unary.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn fold_binary(op: SymbolicOp, lhs: u64, rhs: u64, width: u32) -> Option<u64> {
    let m = mask(width);
    let (a, b) = (lhs & m, rhs & m);
    let (sa, sb) = (to_signed(a, width), to_signed(b, width));
    let result = match op {
        SymbolicOp::Add => a.wrapping_add(b),
        SymbolicOp::Sub => a.wrapping_sub(b),
        SymbolicOp::Mul => a.wrapping_mul(b),
        SymbolicOp::DivU => {
            if b == 0 {
                m
            } else {
                a / b
            }
        }
        SymbolicOp::RemU => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        SymbolicOp::DivS => {
            if sb == 0 {
                if sa < 0 {
                    1
                } else {
                    m
                }
            } else {
                sa.wrapping_div(sb) as u64
            }
        }
        SymbolicOp::RemS => {
            if sb == 0 {
                a
            } else {
                sa.wrapping_rem(sb) as u64
            }
        }
        SymbolicOp::And => a & b,
        SymbolicOp::Or => a | b,
        SymbolicOp::Xor => a ^ b,
        SymbolicOp::Shl => {
            if b >= u64::from(width) {
                0
            } else {
                a << b
            }
        }
        SymbolicOp::ShrU => {
            if b >= u64::from(width) {
                0
            } else {
                a >> b
            }
        }
        SymbolicOp::ShrS => {
            let amount = b.min(u64::from(width) - 1);
            (sa >> amount) as u64
        }
        SymbolicOp::Eq => u64::from(a == b),
        SymbolicOp::Ne => u64::from(a != b),
        SymbolicOp::LtU => u64::from(a < b),
        SymbolicOp::LeU => u64::from(a <= b),
        SymbolicOp::GtU => u64::from(a > b),
        SymbolicOp::GeU => u64::from(a >= b),
        SymbolicOp::LtS => u64::from(sa < sb),
        SymbolicOp::LeS => u64::from(sa <= sb),
        SymbolicOp::GtS => u64::from(sa > sb),
        SymbolicOp::GeS => u64::from(sa >= sb),
        SymbolicOp::Neg | SymbolicOp::Not => return None,
    };
    Some(result & m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraparound_arithmetic() {
        assert_eq!(fold_binary(SymbolicOp::Add, 0xFF, 1, 8), Some(0));
        assert_eq!(fold_binary(SymbolicOp::Sub, 0, 1, 8), Some(0xFF));
        assert_eq!(fold_binary(SymbolicOp::Mul, 0x80, 2, 8), Some(0));
        assert_eq!(
            fold_binary(SymbolicOp::Add, u64::MAX, 2, 64),
            Some(1),
            "64-bit addition wraps like native integers"
        );
    }

    #[test]
    fn test_signed_vs_unsigned_comparison() {
        // 0xFF is 255 unsigned but -1 signed
        assert_eq!(fold_binary(SymbolicOp::LtU, 0xFF, 1, 8), Some(0));
        assert_eq!(fold_binary(SymbolicOp::LtS, 0xFF, 1, 8), Some(1));
        assert_eq!(fold_binary(SymbolicOp::GeS, 0x7F, 0x80, 8), Some(1));
    }

    #[test]
    fn test_division_by_zero_follows_smtlib() {
        assert_eq!(fold_binary(SymbolicOp::DivU, 7, 0, 8), Some(0xFF));
        assert_eq!(fold_binary(SymbolicOp::RemU, 7, 0, 8), Some(7));
        assert_eq!(fold_binary(SymbolicOp::DivS, 7, 0, 8), Some(0xFF));
        assert_eq!(fold_binary(SymbolicOp::DivS, 0xF9, 0, 8), Some(1));
        assert_eq!(fold_binary(SymbolicOp::RemS, 0xF9, 0, 8), Some(0xF9));
    }

    #[test]
    fn test_signed_division() {
        // -7 / 2 == -3, -7 % 2 == -1
        assert_eq!(fold_binary(SymbolicOp::DivS, 0xF9, 2, 8), Some(0xFD));
        assert_eq!(fold_binary(SymbolicOp::RemS, 0xF9, 2, 8), Some(0xFF));
    }

    #[test]
    fn test_shift_saturation() {
        assert_eq!(fold_binary(SymbolicOp::Shl, 1, 8, 8), Some(0));
        assert_eq!(fold_binary(SymbolicOp::ShrU, 0x80, 9, 8), Some(0));
        assert_eq!(fold_binary(SymbolicOp::ShrS, 0x80, 100, 8), Some(0xFF));
        assert_eq!(fold_binary(SymbolicOp::ShrS, 0x40, 100, 8), Some(0));
    }

    #[test]
    fn test_unary() {
        assert_eq!(fold_unary(SymbolicOp::Neg, 1, 16), Some(0xFFFF));
        assert_eq!(fold_unary(SymbolicOp::Not, 0, 1), Some(1));
        assert_eq!(fold_unary(SymbolicOp::Add, 0, 1), None);
    }

    #[test]
    fn test_negated_comparison() {
        for op in [SymbolicOp::Eq, SymbolicOp::LtU, SymbolicOp::GeS] {
            let neg = op.negated_comparison().unwrap();
            for (a, b) in [(0u64, 1u64), (5, 5), (0xF0, 3)] {
                let lhs = fold_binary(op, a, b, 8).unwrap();
                let rhs = fold_binary(neg, a, b, 8).unwrap();
                assert_eq!(lhs ^ rhs, 1);
            }
        }
        assert!(SymbolicOp::Add.negated_comparison().is_none());
    }
}
