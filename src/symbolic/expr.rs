//! Symbolic expression tree representation.
//!
//! This module defines [`SymExpr`], an immutable, reference-counted bit-vector
//! formula. Nodes are shared rather than copied: cloning a [`SymExpr`] only bumps
//! a reference count, so registers, memory and constraint sets of many forked
//! states can point at the same subtrees without synchronization.
//!
//! Every node records its bit-width when it is built and caches a structural hash.
//! Two expressions compare equal when they have the same shape, not when they are
//! mathematically equivalent; deciding the latter requires the solver.
//!
//! Constructors fold constants and apply a handful of shape-preserving rewrites
//! (identity extracts, re-joining adjacent slices of one value, `ite` with a
//! constant condition). Folding uses [`fold_binary`]/[`fold_unary`], which mirror
//! the SMT-LIB semantics the solver applies.

use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashMap, HashSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    symbolic::ops::{fold_binary, fold_unary, mask, SymbolicOp},
    Error, Result,
};

/// Widest bit-vector supported by the expression layer.
pub const MAX_WIDTH: u32 = 64;

/// The shape of a single expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    /// A concrete bit-vector, already masked to the node width.
    Const(u64),

    /// A named, unconstrained input symbol.
    Var(Arc<str>),

    /// A unary operation (Neg, Not).
    Unary {
        /// The operation to perform.
        op: SymbolicOp,
        /// The operand.
        operand: SymExpr,
    },

    /// A binary operation.
    Binary {
        /// The operation to perform.
        op: SymbolicOp,
        /// The left operand.
        lhs: SymExpr,
        /// The right operand.
        rhs: SymExpr,
    },

    /// If-then-else over a 1-bit condition.
    Ite {
        /// 1-bit selector.
        cond: SymExpr,
        /// Value when `cond` is 1.
        then: SymExpr,
        /// Value when `cond` is 0.
        otherwise: SymExpr,
    },

    /// Bits `high..=low` of the operand.
    Extract {
        /// Highest bit, inclusive.
        high: u32,
        /// Lowest bit, inclusive.
        low: u32,
        /// The sliced expression.
        operand: SymExpr,
    },

    /// Zero extension to the node width.
    ZeroExtend(SymExpr),

    /// Sign extension to the node width.
    SignExtend(SymExpr),

    /// `high` placed above `low`.
    Concat {
        /// Most significant part.
        high: SymExpr,
        /// Least significant part.
        low: SymExpr,
    },
}

#[derive(Debug)]
struct ExprNode {
    kind: ExprKind,
    width: u32,
    hash: u64,
}

/// An immutable, shared symbolic bit-vector expression.
///
/// # Examples
///
/// ```rust
/// use symscope::symbolic::{SymExpr, SymbolicOp};
///
/// let input = SymExpr::variable("input", 8)?;
/// let cond = SymExpr::binary(SymbolicOp::Eq, input, SymExpr::byte(0x41))?;
/// assert_eq!(cond.width(), 1);
///
/// // Concrete operands fold immediately
/// let sum = SymExpr::binary(SymbolicOp::Add, SymExpr::byte(0xFF), SymExpr::byte(2))?;
/// assert_eq!(sum.as_const(), Some(1));
/// # Ok::<(), symscope::Error>(())
/// ```
#[derive(Clone)]
pub struct SymExpr(Arc<ExprNode>);

fn check_width(width: u32) -> Result<()> {
    if width == 0 || width > MAX_WIDTH {
        return Err(Error::InvalidWidth(width));
    }
    Ok(())
}

fn expect_width(operation: &'static str, expected: u32, found: u32) -> Result<()> {
    if expected != found {
        return Err(Error::WidthMismatch {
            operation,
            expected,
            found,
        });
    }
    Ok(())
}

impl SymExpr {
    fn make(kind: ExprKind, width: u32) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        width.hash(&mut hasher);
        let hash = hasher.finish();
        SymExpr(Arc::new(ExprNode { kind, width, hash }))
    }

    /// Creates a constant of the given width, masking `value` to fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `width` is not in `1..=64`.
    pub fn constant(value: u64, width: u32) -> Result<Self> {
        check_width(width)?;
        Ok(Self::make(ExprKind::Const(value & mask(width)), width))
    }

    /// Creates a 64-bit constant.
    #[must_use]
    pub fn word(value: u64) -> Self {
        Self::make(ExprKind::Const(value), 64)
    }

    /// Creates an 8-bit constant.
    #[must_use]
    pub fn byte(value: u8) -> Self {
        Self::make(ExprKind::Const(u64::from(value)), 8)
    }

    /// Creates a 1-bit boolean constant.
    #[must_use]
    pub fn truth(value: bool) -> Self {
        Self::make(ExprKind::Const(u64::from(value)), 1)
    }

    /// Creates a named free variable.
    ///
    /// Variables are identified by name; using one name with two widths in a single
    /// query is rejected by the solver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `width` is not in `1..=64`.
    pub fn variable(name: impl AsRef<str>, width: u32) -> Result<Self> {
        check_width(width)?;
        Ok(Self::make(ExprKind::Var(Arc::from(name.as_ref())), width))
    }

    /// Builds a unary operation node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if `op` is not a unary operation.
    pub fn unary(op: SymbolicOp, operand: Self) -> Result<Self> {
        let width = operand.width();
        if !op.is_unary() {
            return Err(Error::WidthMismatch {
                operation: op.name(),
                expected: 2,
                found: 1,
            });
        }

        if let Some(v) = operand.as_const() {
            if let Some(folded) = fold_unary(op, v, width) {
                return Ok(Self::make(ExprKind::Const(folded), width));
            }
        }

        // ~~x == x, --x == x
        if let ExprKind::Unary {
            op: inner,
            operand: x,
        } = operand.kind()
        {
            if *inner == op {
                return Ok(x.clone());
            }
        }

        Ok(Self::make(ExprKind::Unary { op, operand }, width))
    }

    /// Builds a binary operation node.
    ///
    /// Arithmetic and bitwise operations keep the operand width; comparisons yield
    /// a 1-bit result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if the operand widths differ or `op` is unary.
    pub fn binary(op: SymbolicOp, lhs: Self, rhs: Self) -> Result<Self> {
        if op.is_unary() {
            return Err(Error::WidthMismatch {
                operation: op.name(),
                expected: 1,
                found: 2,
            });
        }
        let width = lhs.width();
        expect_width(op.name(), width, rhs.width())?;
        let result_width = if op.is_comparison() { 1 } else { width };

        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            if let Some(folded) = fold_binary(op, a, b, width) {
                return Ok(Self::make(ExprKind::Const(folded), result_width));
            }
        }

        if let Some(simplified) = Self::simplify_binary(op, &lhs, &rhs, width) {
            return Ok(simplified);
        }

        Ok(Self::make(ExprKind::Binary { op, lhs, rhs }, result_width))
    }

    /// Identity and absorption rules that never change meaning.
    fn simplify_binary(op: SymbolicOp, lhs: &Self, rhs: &Self, width: u32) -> Option<Self> {
        let all_ones = mask(width);
        match (op, lhs.as_const(), rhs.as_const()) {
            (
                SymbolicOp::Add
                | SymbolicOp::Or
                | SymbolicOp::Xor
                | SymbolicOp::Sub
                | SymbolicOp::Shl
                | SymbolicOp::ShrU
                | SymbolicOp::ShrS,
                _,
                Some(0),
            )
            | (SymbolicOp::Mul | SymbolicOp::DivU, _, Some(1)) => Some(lhs.clone()),
            (SymbolicOp::Add | SymbolicOp::Or | SymbolicOp::Xor, Some(0), _)
            | (SymbolicOp::Mul, Some(1), _) => Some(rhs.clone()),
            (SymbolicOp::And, _, Some(c)) if c == all_ones => Some(lhs.clone()),
            (SymbolicOp::And, Some(c), _) if c == all_ones => Some(rhs.clone()),
            (SymbolicOp::And | SymbolicOp::Mul, _, Some(0))
            | (SymbolicOp::And | SymbolicOp::Mul, Some(0), _) => {
                Some(Self::make(ExprKind::Const(0), width))
            }
            (SymbolicOp::Or, _, Some(c)) | (SymbolicOp::Or, Some(c), _) if c == all_ones => {
                Some(Self::make(ExprKind::Const(all_ones), width))
            }
            _ if lhs == rhs => match op {
                SymbolicOp::Eq | SymbolicOp::LeU | SymbolicOp::LeS | SymbolicOp::GeU
                | SymbolicOp::GeS => Some(Self::truth(true)),
                SymbolicOp::Ne | SymbolicOp::LtU | SymbolicOp::LtS | SymbolicOp::GtU
                | SymbolicOp::GtS => Some(Self::truth(false)),
                SymbolicOp::Xor | SymbolicOp::Sub => Some(Self::make(ExprKind::Const(0), width)),
                SymbolicOp::And | SymbolicOp::Or => Some(lhs.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Builds an if-then-else node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if `cond` is not 1 bit wide or the branches
    /// differ in width.
    pub fn ite(cond: Self, then: Self, otherwise: Self) -> Result<Self> {
        expect_width("ite", 1, cond.width())?;
        expect_width("ite", then.width(), otherwise.width())?;

        if let Some(c) = cond.as_const() {
            return Ok(if c == 1 { then } else { otherwise });
        }
        if then == otherwise {
            return Ok(then);
        }

        let width = then.width();
        Ok(Self::make(
            ExprKind::Ite {
                cond,
                then,
                otherwise,
            },
            width,
        ))
    }

    /// Extracts bits `high..=low` from `operand`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if the range is empty or exceeds the operand.
    pub fn extract(high: u32, low: u32, operand: Self) -> Result<Self> {
        if high < low || high >= operand.width() {
            return Err(Error::InvalidWidth(high.saturating_sub(low) + 1));
        }
        let width = high - low + 1;

        if low == 0 && width == operand.width() {
            return Ok(operand);
        }
        if let Some(v) = operand.as_const() {
            return Ok(Self::make(ExprKind::Const((v >> low) & mask(width)), width));
        }

        match operand.kind() {
            ExprKind::Extract {
                low: inner_low,
                operand: inner,
                ..
            } => return Self::extract(high + inner_low, low + inner_low, inner.clone()),
            ExprKind::Concat { high: hi, low: lo } => {
                let split = lo.width();
                if high < split {
                    return Self::extract(high, low, lo.clone());
                }
                if low >= split {
                    return Self::extract(high - split, low - split, hi.clone());
                }
            }
            ExprKind::ZeroExtend(inner) if high < inner.width() => {
                return Self::extract(high, low, inner.clone());
            }
            ExprKind::ZeroExtend(inner) if low >= inner.width() => {
                return Ok(Self::make(ExprKind::Const(0), width));
            }
            _ => {}
        }

        Ok(Self::make(ExprKind::Extract { high, low, operand }, width))
    }

    /// Zero-extends `operand` to `width` bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `width` is smaller than the operand or above 64.
    pub fn zero_extend(operand: Self, width: u32) -> Result<Self> {
        check_width(width)?;
        if width < operand.width() {
            return Err(Error::InvalidWidth(width));
        }
        if width == operand.width() {
            return Ok(operand);
        }
        if let Some(v) = operand.as_const() {
            return Ok(Self::make(ExprKind::Const(v), width));
        }
        Ok(Self::make(ExprKind::ZeroExtend(operand), width))
    }

    /// Sign-extends `operand` to `width` bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `width` is smaller than the operand or above 64.
    #[allow(clippy::cast_sign_loss)]
    pub fn sign_extend(operand: Self, width: u32) -> Result<Self> {
        check_width(width)?;
        if width < operand.width() {
            return Err(Error::InvalidWidth(width));
        }
        if width == operand.width() {
            return Ok(operand);
        }
        if let Some(v) = operand.as_const() {
            let extended = super::ops::to_signed(v, operand.width()) as u64 & mask(width);
            return Ok(Self::make(ExprKind::Const(extended), width));
        }
        Ok(Self::make(ExprKind::SignExtend(operand), width))
    }

    /// Concatenates `high` above `low`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if the combined width exceeds 64 bits.
    pub fn concat(high: Self, low: Self) -> Result<Self> {
        let width = high.width() + low.width();
        check_width(width)?;

        if let (Some(h), Some(l)) = (high.as_const(), low.as_const()) {
            return Ok(Self::make(ExprKind::Const((h << low.width()) | l), width));
        }

        // x[h1:l1] ++ x[l1-1:l2]  ==>  x[h1:l2]
        if let (
            ExprKind::Extract {
                high: h1,
                low: l1,
                operand: x1,
            },
            ExprKind::Extract {
                high: h2,
                low: l2,
                operand: x2,
            },
        ) = (high.kind(), low.kind())
        {
            if x1 == x2 && *l1 == h2 + 1 {
                return Self::extract(*h1, *l2, x1.clone());
            }
        }

        if high.as_const() == Some(0) {
            return Self::zero_extend(low, width);
        }

        Ok(Self::make(ExprKind::Concat { high, low }, width))
    }

    /// Builds `self == other`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if the widths differ.
    pub fn equals(&self, other: &Self) -> Result<Self> {
        Self::binary(SymbolicOp::Eq, self.clone(), other.clone())
    }

    /// Builds the boolean negation of a 1-bit expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if `self` is not 1 bit wide.
    pub fn not(&self) -> Result<Self> {
        expect_width("not", 1, self.width())?;
        if let ExprKind::Binary { op, lhs, rhs } = self.kind() {
            if let Some(negated) = op.negated_comparison() {
                return Self::binary(negated, lhs.clone(), rhs.clone());
            }
        }
        Self::unary(SymbolicOp::Not, self.clone())
    }

    /// Builds the conjunction of two 1-bit expressions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if either side is not 1 bit wide.
    pub fn and(&self, other: &Self) -> Result<Self> {
        expect_width("and", 1, self.width())?;
        Self::binary(SymbolicOp::And, self.clone(), other.clone())
    }

    /// Builds the disjunction of two 1-bit expressions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if either side is not 1 bit wide.
    pub fn or(&self, other: &Self) -> Result<Self> {
        expect_width("or", 1, self.width())?;
        Self::binary(SymbolicOp::Or, self.clone(), other.clone())
    }

    /// Returns the node shape.
    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Returns the bit-width fixed at construction.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width
    }

    /// Returns the cached structural hash.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        self.0.hash
    }

    /// Returns the value if this is a constant.
    #[must_use]
    pub fn as_const(&self) -> Option<u64> {
        match self.kind() {
            ExprKind::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Checks if this expression is a constant.
    #[must_use]
    pub fn is_const(&self) -> bool {
        matches!(self.kind(), ExprKind::Const(_))
    }

    /// Checks if this expression is the 1-bit constant `1`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.width() == 1 && self.as_const() == Some(1)
    }

    /// Checks if this expression is the 1-bit constant `0`.
    #[must_use]
    pub fn is_false(&self) -> bool {
        self.width() == 1 && self.as_const() == Some(0)
    }

    /// Returns the variable name if this is a free variable.
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Checks if both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn node_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Collects every free variable with its width.
    #[must_use]
    pub fn variables(&self) -> BTreeMap<Arc<str>, u32> {
        self.post_order()
            .into_iter()
            .filter_map(|expr| match expr.kind() {
                ExprKind::Var(name) => Some((name.clone(), expr.width())),
                _ => None,
            })
            .collect()
    }

    /// Every distinct node below and including `self`, operands before their users.
    ///
    /// Shared nodes appear once. The walk uses an explicit stack, so depth is bounded
    /// only by memory.
    pub(crate) fn post_order(&self) -> Vec<SymExpr> {
        self.post_order_where(|_| false)
    }

    /// Like [`SymExpr::post_order`], but stops at nodes for which `done` holds.
    ///
    /// Such nodes and everything below them are left out of the result.
    pub(crate) fn post_order_where(
        &self,
        mut done: impl FnMut(&SymExpr) -> bool,
    ) -> Vec<SymExpr> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(self.clone(), false)];
        while let Some((expr, expanded)) = stack.pop() {
            if expanded {
                order.push(expr);
                continue;
            }
            if done(&expr) || !visited.insert(expr.node_id()) {
                continue;
            }
            let operands: Vec<SymExpr> = expr.kind().operands().cloned().collect();
            stack.push((expr, true));
            stack.extend(operands.into_iter().rev().map(|operand| (operand, false)));
        }
        order
    }

    /// Evaluates the expression under concrete variable bindings.
    ///
    /// # Arguments
    ///
    /// * `bindings` - Map from variable names to their concrete values.
    ///
    /// # Returns
    ///
    /// `Some(value)` masked to the expression width, or `None` if a variable the
    /// result depends on is unbound. Unbound variables in the branch an `ite` does
    /// not take are ignored.
    #[must_use]
    pub fn evaluate(&self, bindings: &HashMap<String, u64>) -> Option<u64> {
        let mut values: HashMap<usize, u64> = HashMap::new();
        for node in self.post_order() {
            if let Some(value) = node.evaluate_node(bindings, &values) {
                values.insert(node.node_id(), value);
            }
        }
        values.get(&self.node_id()).copied()
    }

    /// Value of this node given the values of its operands.
    #[allow(clippy::cast_sign_loss)]
    fn evaluate_node(
        &self,
        bindings: &HashMap<String, u64>,
        values: &HashMap<usize, u64>,
    ) -> Option<u64> {
        let get = |expr: &SymExpr| values.get(&expr.node_id()).copied();
        let width = self.width();
        Some(match self.kind() {
            ExprKind::Const(v) => *v,
            ExprKind::Var(name) => bindings.get(name.as_ref())? & mask(width),
            ExprKind::Unary { op, operand } => fold_unary(*op, get(operand)?, width)?,
            ExprKind::Binary { op, lhs, rhs } => {
                fold_binary(*op, get(lhs)?, get(rhs)?, lhs.width())?
            }
            ExprKind::Ite {
                cond,
                then,
                otherwise,
            } => {
                if get(cond)? == 1 {
                    get(then)?
                } else {
                    get(otherwise)?
                }
            }
            ExprKind::Extract { low, operand, .. } => (get(operand)? >> low) & mask(width),
            ExprKind::ZeroExtend(operand) => get(operand)?,
            ExprKind::SignExtend(operand) => {
                super::ops::to_signed(get(operand)?, operand.width()) as u64 & mask(width)
            }
            ExprKind::Concat { high, low } => (get(high)? << low.width()) | get(low)?,
        })
    }

    /// Appends an unambiguous encoding of the expression to `out`.
    ///
    /// Nodes are written operands first and refer to their operands by position.
    /// Structurally equal subtrees are written once, so the encoding depends only on
    /// the shape of the expression and two expressions share an encoding exactly
    /// when they are equal.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn encode_canonical(&self, out: &mut Vec<u8>) {
        let mut positions: HashMap<SymExpr, u32> = HashMap::new();
        for node in self.post_order() {
            if positions.contains_key(&node) {
                continue;
            }
            let position =
                |expr: &SymExpr| positions.get(expr).copied().unwrap_or(u32::MAX).to_le_bytes();

            out.push(node.kind().tag());
            out.push(node.width() as u8);
            match node.kind() {
                ExprKind::Const(v) => out.extend_from_slice(&v.to_le_bytes()),
                ExprKind::Var(name) => {
                    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
                    out.extend_from_slice(name.as_bytes());
                }
                ExprKind::Unary { op, operand } => {
                    out.push(*op as u8);
                    out.extend_from_slice(&position(operand));
                }
                ExprKind::Binary { op, lhs, rhs } => {
                    out.push(*op as u8);
                    out.extend_from_slice(&position(lhs));
                    out.extend_from_slice(&position(rhs));
                }
                ExprKind::Extract { high, low, operand } => {
                    out.push(*high as u8);
                    out.push(*low as u8);
                    out.extend_from_slice(&position(operand));
                }
                ExprKind::Ite { .. }
                | ExprKind::ZeroExtend(_)
                | ExprKind::SignExtend(_)
                | ExprKind::Concat { .. } => {
                    for operand in node.kind().operands() {
                        out.extend_from_slice(&position(operand));
                    }
                }
            }

            let next = positions.len() as u32;
            positions.insert(node, next);
        }
    }
}

impl ExprKind {
    /// The operand expressions of this node, in field order.
    pub fn operands(&self) -> impl Iterator<Item = &SymExpr> {
        let (a, b, c) = match self {
            ExprKind::Const(_) | ExprKind::Var(_) => (None, None, None),
            ExprKind::Unary { operand, .. }
            | ExprKind::Extract { operand, .. }
            | ExprKind::ZeroExtend(operand)
            | ExprKind::SignExtend(operand) => (Some(operand), None, None),
            ExprKind::Binary { lhs, rhs, .. } => (Some(lhs), Some(rhs), None),
            ExprKind::Concat { high, low } => (Some(high), Some(low), None),
            ExprKind::Ite {
                cond,
                then,
                otherwise,
            } => (Some(cond), Some(then), Some(otherwise)),
        };
        [a, b, c].into_iter().flatten()
    }

    fn tag(&self) -> u8 {
        match self {
            ExprKind::Const(_) => 0,
            ExprKind::Var(_) => 1,
            ExprKind::Unary { .. } => 2,
            ExprKind::Binary { .. } => 3,
            ExprKind::Ite { .. } => 4,
            ExprKind::Extract { .. } => 5,
            ExprKind::ZeroExtend(_) => 6,
            ExprKind::SignExtend(_) => 7,
            ExprKind::Concat { .. } => 8,
        }
    }

    /// Moves the operands out, leaving a constant behind.
    fn detach_operands(&mut self, out: &mut Vec<SymExpr>) {
        match std::mem::replace(self, ExprKind::Const(0)) {
            ExprKind::Const(_) | ExprKind::Var(_) => {}
            ExprKind::Unary { operand, .. }
            | ExprKind::Extract { operand, .. }
            | ExprKind::ZeroExtend(operand)
            | ExprKind::SignExtend(operand) => out.push(operand),
            ExprKind::Binary { lhs, rhs, .. } => out.extend([lhs, rhs]),
            ExprKind::Concat { high, low } => out.extend([high, low]),
            ExprKind::Ite {
                cond,
                then,
                otherwise,
            } => out.extend([cond, then, otherwise]),
        }
    }
}

impl Drop for ExprNode {
    fn drop(&mut self) {
        // Unlink uniquely owned operands iteratively so long chains do not recurse once per node
        let mut pending = Vec::new();
        self.kind.detach_operands(&mut pending);
        while let Some(expr) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(expr.0) {
                node.kind.detach_operands(&mut pending);
            }
        }
    }
}

impl PartialEq for SymExpr {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.ptr_eq(b) {
                continue;
            }
            if a.0.hash != b.0.hash || a.0.width != b.0.width {
                return false;
            }
            match (a.kind(), b.kind()) {
                (ExprKind::Const(x), ExprKind::Const(y)) if x == y => {}
                (ExprKind::Var(x), ExprKind::Var(y)) if x == y => {}
                (
                    ExprKind::Unary { op: o1, operand: x },
                    ExprKind::Unary { op: o2, operand: y },
                ) if o1 == o2 => pending.push((x, y)),
                (
                    ExprKind::Binary {
                        op: o1,
                        lhs: l1,
                        rhs: r1,
                    },
                    ExprKind::Binary {
                        op: o2,
                        lhs: l2,
                        rhs: r2,
                    },
                ) if o1 == o2 => pending.extend([(l1, l2), (r1, r2)]),
                (
                    ExprKind::Ite {
                        cond: c1,
                        then: t1,
                        otherwise: e1,
                    },
                    ExprKind::Ite {
                        cond: c2,
                        then: t2,
                        otherwise: e2,
                    },
                ) => pending.extend([(c1, c2), (t1, t2), (e1, e2)]),
                (
                    ExprKind::Extract {
                        high: h1,
                        low: l1,
                        operand: x,
                    },
                    ExprKind::Extract {
                        high: h2,
                        low: l2,
                        operand: y,
                    },
                ) if h1 == h2 && l1 == l2 => pending.push((x, y)),
                (ExprKind::ZeroExtend(x), ExprKind::ZeroExtend(y))
                | (ExprKind::SignExtend(x), ExprKind::SignExtend(y)) => pending.push((x, y)),
                (
                    ExprKind::Concat { high: h1, low: l1 },
                    ExprKind::Concat { high: h2, low: l2 },
                ) => pending.extend([(h1, h2), (l1, l2)]),
                _ => return false,
            }
        }
        true
    }
}

impl Eq for SymExpr {}

impl Hash for SymExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Pending output of the [`SymExpr`] printer.
enum Piece<'a> {
    Expr(&'a SymExpr),
    Text(&'static str),
    Op(SymbolicOp),
    Slice(u32, u32),
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Piece::Expr(self)];
        while let Some(piece) = pending.pop() {
            let expr = match piece {
                Piece::Expr(expr) => expr,
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Op(op) => {
                    write!(f, "{op}")?;
                    continue;
                }
                Piece::Slice(high, low) => {
                    write!(f, "[{high}:{low}]")?;
                    continue;
                }
            };

            match expr.kind() {
                ExprKind::Const(v) => write!(f, "{v:#x}#{}", expr.width())?,
                ExprKind::Var(name) => f.write_str(name)?,
                ExprKind::Unary { op, operand } => {
                    pending.extend([Piece::Expr(operand), Piece::Op(*op)]);
                }
                ExprKind::Binary { op, lhs, rhs } => pending.extend([
                    Piece::Text(")"),
                    Piece::Expr(rhs),
                    Piece::Text(" "),
                    Piece::Op(*op),
                    Piece::Text(" "),
                    Piece::Expr(lhs),
                    Piece::Text("("),
                ]),
                ExprKind::Ite {
                    cond,
                    then,
                    otherwise,
                } => pending.extend([
                    Piece::Text(")"),
                    Piece::Expr(otherwise),
                    Piece::Text(", "),
                    Piece::Expr(then),
                    Piece::Text(", "),
                    Piece::Expr(cond),
                    Piece::Text("ite("),
                ]),
                ExprKind::Extract { high, low, operand } => {
                    pending.extend([Piece::Slice(*high, *low), Piece::Expr(operand)]);
                }
                ExprKind::ZeroExtend(operand) => {
                    write!(f, "zext{}(", expr.width())?;
                    pending.extend([Piece::Text(")"), Piece::Expr(operand)]);
                }
                ExprKind::SignExtend(operand) => {
                    write!(f, "sext{}(", expr.width())?;
                    pending.extend([Piece::Text(")"), Piece::Expr(operand)]);
                }
                ExprKind::Concat { high, low } => pending.extend([
                    Piece::Text(")"),
                    Piece::Expr(low),
                    Piece::Text(" ++ "),
                    Piece::Expr(high),
                    Piece::Text("("),
                ]),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_width_rules() -> Result<()> {
        let x = SymExpr::variable("x", 32)?;
        let y = SymExpr::variable("y", 32)?;

        let sum = SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?;
        assert_eq!(sum.width(), 32);

        let cmp = SymExpr::binary(SymbolicOp::LtU, x, y)?;
        assert_eq!(cmp.width(), 1);
        Ok(())
    }

    #[test]
    fn test_width_mismatch_rejected() -> Result<()> {
        let x = SymExpr::variable("x", 32)?;
        let b = SymExpr::byte(1);
        assert!(matches!(
            SymExpr::binary(SymbolicOp::Add, x, b),
            Err(Error::WidthMismatch { .. })
        ));
        assert!(matches!(
            SymExpr::constant(0, 65),
            Err(Error::InvalidWidth(65))
        ));
        assert!(matches!(SymExpr::variable("v", 0), Err(Error::InvalidWidth(0))));
        Ok(())
    }

    #[test]
    fn test_constant_folding_wraps() -> Result<()> {
        let folded = SymExpr::binary(SymbolicOp::Add, SymExpr::byte(0xF0), SymExpr::byte(0x20))?;
        assert_eq!(folded.as_const(), Some(0x10));
        assert_eq!(folded.width(), 8);
        Ok(())
    }

    #[test]
    fn test_structural_equality() -> Result<()> {
        let a = SymExpr::binary(
            SymbolicOp::Add,
            SymExpr::variable("x", 8)?,
            SymExpr::variable("y", 8)?,
        )?;
        let b = SymExpr::binary(
            SymbolicOp::Add,
            SymExpr::variable("x", 8)?,
            SymExpr::variable("y", 8)?,
        )?;
        let c = SymExpr::binary(
            SymbolicOp::Add,
            SymExpr::variable("y", 8)?,
            SymExpr::variable("x", 8)?,
        )?;

        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
        // Mathematically equal, structurally different
        assert_ne!(a, c);
        Ok(())
    }

    #[test]
    fn test_extract_concat_rejoin() -> Result<()> {
        let x = SymExpr::variable("x", 32)?;
        let bytes: Vec<SymExpr> = (0..4)
            .map(|i| SymExpr::extract(i * 8 + 7, i * 8, x.clone()))
            .collect::<Result<_>>()?;

        let mut joined = bytes[3].clone();
        for byte in bytes[..3].iter().rev() {
            joined = SymExpr::concat(joined, byte.clone())?;
        }
        assert_eq!(joined, x);
        Ok(())
    }

    #[test]
    fn test_extract_through_concat_and_extend() -> Result<()> {
        let hi = SymExpr::variable("hi", 8)?;
        let lo = SymExpr::variable("lo", 8)?;
        let pair = SymExpr::concat(hi.clone(), lo.clone())?;
        assert_eq!(SymExpr::extract(7, 0, pair.clone())?, lo);
        assert_eq!(SymExpr::extract(15, 8, pair)?, hi);

        let wide = SymExpr::zero_extend(lo.clone(), 64)?;
        assert_eq!(SymExpr::extract(7, 0, wide.clone())?, lo);
        assert_eq!(SymExpr::extract(63, 8, wide)?.as_const(), Some(0));
        Ok(())
    }

    #[test]
    fn test_not_flips_comparison() -> Result<()> {
        let x = SymExpr::variable("x", 8)?;
        let cond = SymExpr::binary(SymbolicOp::LtU, x.clone(), SymExpr::byte(10))?;
        let negated = cond.not()?;
        assert_eq!(
            negated,
            SymExpr::binary(SymbolicOp::GeU, x, SymExpr::byte(10))?
        );
        assert_eq!(negated.not()?, cond);
        Ok(())
    }

    #[test]
    fn test_ite_simplification() -> Result<()> {
        let a = SymExpr::variable("a", 16)?;
        let b = SymExpr::variable("b", 16)?;
        assert_eq!(SymExpr::ite(SymExpr::truth(true), a.clone(), b.clone())?, a);
        assert_eq!(SymExpr::ite(SymExpr::truth(false), a.clone(), b.clone())?, b);

        let c = SymExpr::variable("c", 1)?;
        assert_eq!(SymExpr::ite(c.clone(), a.clone(), a.clone())?, a);
        assert!(matches!(
            SymExpr::ite(c, a, SymExpr::byte(1)),
            Err(Error::WidthMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_evaluate() -> Result<()> {
        let x = SymExpr::variable("x", 8)?;
        let y = SymExpr::variable("y", 8)?;
        let expr = SymExpr::binary(
            SymbolicOp::Xor,
            SymExpr::binary(SymbolicOp::Mul, x.clone(), SymExpr::byte(3))?,
            y,
        )?;

        assert_eq!(expr.evaluate(&bind(&[("x", 0x60), ("y", 0x01)])), Some(0x21));
        assert_eq!(expr.evaluate(&bind(&[("x", 1)])), None);

        let sext = SymExpr::sign_extend(x, 16)?;
        assert_eq!(sext.evaluate(&bind(&[("x", 0x80)])), Some(0xFF80));
        Ok(())
    }

    #[test]
    fn test_variables() -> Result<()> {
        let expr = SymExpr::binary(
            SymbolicOp::Add,
            SymExpr::variable("a", 8)?,
            SymExpr::zero_extend(SymExpr::variable("b", 4)?, 8)?,
        )?;
        let vars = expr.variables();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("a"), Some(&8));
        assert_eq!(vars.get("b"), Some(&4));
        Ok(())
    }

    #[test]
    fn test_display() -> Result<()> {
        let expr = SymExpr::binary(
            SymbolicOp::Eq,
            SymExpr::variable("input", 8)?,
            SymExpr::byte(0x41),
        )?;
        assert_eq!(expr.to_string(), "(input == 0x41#8)");
        Ok(())
    }

    fn add_chain(depth: usize) -> Result<SymExpr> {
        let y = SymExpr::variable("y", 64)?;
        let mut acc = SymExpr::variable("x", 64)?;
        for _ in 0..depth {
            acc = SymExpr::binary(SymbolicOp::Add, acc, y.clone())?;
        }
        Ok(acc)
    }

    #[test]
    fn test_deep_chain() -> Result<()> {
        let depth = 100_000;
        let chain = add_chain(depth)?;

        let value = chain.evaluate(&bind(&[("x", 7), ("y", 2)]));
        assert_eq!(value, Some(7 + 2 * depth as u64));
        assert_eq!(chain.evaluate(&bind(&[("x", 7)])), None);

        let text = chain.to_string();
        assert!(text.starts_with("((") && text.ends_with("y) + y)"));
        assert_eq!(text.len(), depth + 1 + depth * " + y)".len());
        assert_eq!(text.matches(" + y)").count(), depth);

        assert_eq!(chain, add_chain(depth)?);
        assert_ne!(chain, add_chain(depth - 1)?);
        assert_eq!(chain.variables().len(), 2);

        drop(chain);
        Ok(())
    }

    #[test]
    fn test_evaluate_ignores_untaken_branch() -> Result<()> {
        let c = SymExpr::variable("c", 1)?;
        let expr = SymExpr::ite(c, SymExpr::byte(5), SymExpr::variable("free", 8)?)?;
        assert_eq!(expr.evaluate(&bind(&[("c", 1)])), Some(5));
        assert_eq!(expr.evaluate(&bind(&[("c", 0)])), None);
        Ok(())
    }

    #[test]
    fn test_canonical_encoding() -> Result<()> {
        let x = SymExpr::variable("x", 8)?;
        let y = SymExpr::variable("y", 8)?;
        let encode = |expr: &SymExpr| {
            let mut out = Vec::new();
            expr.encode_canonical(&mut out);
            out
        };

        let xy = SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?;
        let yx = SymExpr::binary(SymbolicOp::Add, y.clone(), x.clone())?;
        assert_ne!(encode(&xy), encode(&yx));

        let sum = SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?;
        let shared = SymExpr::binary(SymbolicOp::Mul, sum.clone(), sum)?;
        let rebuilt = SymExpr::binary(
            SymbolicOp::Mul,
            SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?,
            SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?,
        )?;
        assert_eq!(encode(&shared), encode(&rebuilt));

        let wide = SymExpr::zero_extend(x.clone(), 16)?;
        let signed = SymExpr::sign_extend(x, 16)?;
        assert_ne!(encode(&wide), encode(&signed));
        Ok(())
    }
}
