//! Symbolic value layer.
//!
//! Unknown data is represented as formulas over fixed-width bit-vectors. Operations
//! on symbolic values build larger formulas instead of computing results; concrete
//! operands are folded on the spot so fully known computations never reach the
//! solver.
//!
//! # Key Components
//!
//! - [`SymExpr`] - Immutable, reference-counted expression node
//! - [`ExprKind`] - The shape of an expression node
//! - [`SymbolicOp`] - Operators available in expressions
//!
//! # Semantics
//!
//! | Operation class | Result width | Notes |
//! |-----------------|--------------|-------|
//! | Arithmetic | operand width | two's-complement wraparound |
//! | Bitwise | operand width | |
//! | Shifts | operand width | amounts `>= width` saturate |
//! | Comparisons | 1 | signedness is part of the operator |
//!
//! Division by zero follows SMT-LIB: unsigned division yields all ones, unsigned
//! remainder yields the dividend.
//!
//! # Thread Safety
//!
//! [`SymExpr`] is `Send + Sync`. Expressions are never mutated after construction,
//! so any number of states and worker threads can share them.

mod expr;
mod ops;

pub use expr::{ExprKind, SymExpr, MAX_WIDTH};
pub use ops::{fold_binary, fold_unary, mask, to_signed, SymbolicOp};
