//! Lowering of [`SymExpr`] trees into Z3 bit-vector terms.
//!
//! Booleans travel as 1-bit vectors: comparisons produce `ite(cmp, 1, 0)` and a
//! 1-bit term is asserted by equating it with `1`. Shared subtrees are translated once
//! per query, keyed by node identity.

use std::{collections::HashMap, sync::Arc};

use z3::ast::BV;

use crate::{
    solver::SolverError,
    symbolic::{ExprKind, SymExpr, SymbolicOp},
};

pub(crate) struct Translator {
    nodes: HashMap<usize, BV>,
    vars: HashMap<Arc<str>, (u32, BV)>,
}

impl Translator {
    pub(crate) fn new() -> Self {
        Translator {
            nodes: HashMap::new(),
            vars: HashMap::new(),
        }
    }

    /// Translates a 1-bit expression into an assertable boolean.
    pub(crate) fn assertion(&mut self, expr: &SymExpr) -> Result<z3::ast::Bool, SolverError> {
        if expr.width() != 1 {
            return Err(SolverError::Unknown(format!(
                "cannot assert {}-bit expression {expr}",
                expr.width()
            )));
        }
        let term = self.translate(expr)?;
        Ok(term.eq(&BV::from_u64(1, 1)))
    }

    /// Translates `expr` and every subtree not yet seen by this translator.
    ///
    /// Nodes are lowered in post-order from an explicit worklist, so arbitrarily deep
    /// expressions do not grow the call stack.
    pub(crate) fn translate(&mut self, expr: &SymExpr) -> Result<BV, SolverError> {
        if let Some(done) = self.nodes.get(&expr.node_id()) {
            return Ok(done.clone());
        }

        let pending = {
            let nodes = &self.nodes;
            expr.post_order_where(|e| nodes.contains_key(&e.node_id()))
        };
        for node in pending {
            let term = self.lower(&node)?;
            self.nodes.insert(node.node_id(), term);
        }

        self.nodes.get(&expr.node_id()).cloned().ok_or_else(|| {
            SolverError::Unknown(format!("{}-bit expression was not lowered", expr.width()))
        })
    }

    /// Builds the term for one node whose operands are already translated.
    fn lower(&mut self, expr: &SymExpr) -> Result<BV, SolverError> {
        let width = expr.width();
        Ok(match expr.kind() {
            ExprKind::Const(value) => BV::from_u64(*value, width),
            ExprKind::Var(name) => self.variable(name, width)?,
            ExprKind::Unary { op, operand } => {
                let inner = self.term(operand)?;
                match op {
                    SymbolicOp::Neg => inner.bvneg(),
                    SymbolicOp::Not => inner.bvnot(),
                    other => {
                        return Err(SolverError::Unknown(format!(
                            "{} is not a unary operation",
                            other.name()
                        )))
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => binary(*op, self.term(lhs)?, self.term(rhs)?),
            ExprKind::Ite {
                cond,
                then,
                otherwise,
            } => self
                .term(cond)?
                .eq(&BV::from_u64(1, 1))
                .ite(self.term(then)?, self.term(otherwise)?),
            ExprKind::Extract { high, low, operand } => self.term(operand)?.extract(*high, *low),
            ExprKind::ZeroExtend(operand) => {
                self.term(operand)?.zero_ext(width - operand.width())
            }
            ExprKind::SignExtend(operand) => {
                self.term(operand)?.sign_ext(width - operand.width())
            }
            ExprKind::Concat { high, low } => self.term(high)?.concat(self.term(low)?),
        })
    }

    fn term(&self, expr: &SymExpr) -> Result<&BV, SolverError> {
        self.nodes.get(&expr.node_id()).ok_or_else(|| {
            SolverError::Unknown("operand lowered out of order".to_string())
        })
    }

    fn variable(&mut self, name: &Arc<str>, width: u32) -> Result<BV, SolverError> {
        if let Some((known, term)) = self.vars.get(name) {
            if *known != width {
                return Err(SolverError::Unknown(format!(
                    "variable {name} used as both {known} and {width} bits"
                )));
            }
            return Ok(term.clone());
        }
        let term = BV::new_const(name.as_ref(), width);
        self.vars.insert(Arc::clone(name), (width, term.clone()));
        Ok(term)
    }
}

fn flag(cmp: &z3::ast::Bool) -> BV {
    cmp.ite(&BV::from_u64(1, 1), &BV::from_u64(0, 1))
}

fn binary(op: SymbolicOp, l: &BV, r: &BV) -> BV {
    match op {
        SymbolicOp::Add => l.bvadd(r),
        SymbolicOp::Sub => l.bvsub(r),
        SymbolicOp::Mul => l.bvmul(r),
        SymbolicOp::DivS => l.bvsdiv(r),
        SymbolicOp::DivU => l.bvudiv(r),
        SymbolicOp::RemS => l.bvsrem(r),
        SymbolicOp::RemU => l.bvurem(r),
        SymbolicOp::And => l.bvand(r),
        SymbolicOp::Or => l.bvor(r),
        SymbolicOp::Xor => l.bvxor(r),
        SymbolicOp::Shl => l.bvshl(r),
        SymbolicOp::ShrS => l.bvashr(r),
        SymbolicOp::ShrU => l.bvlshr(r),
        SymbolicOp::Eq => flag(&l.eq(r)),
        SymbolicOp::Ne => flag(&l.eq(r).not()),
        SymbolicOp::LtS => flag(&l.bvslt(r)),
        SymbolicOp::LtU => flag(&l.bvult(r)),
        SymbolicOp::GtS => flag(&l.bvsgt(r)),
        SymbolicOp::GtU => flag(&l.bvugt(r)),
        SymbolicOp::LeS => flag(&l.bvsle(r)),
        SymbolicOp::LeU => flag(&l.bvule(r)),
        SymbolicOp::GeS => flag(&l.bvsge(r)),
        SymbolicOp::GeU => flag(&l.bvuge(r)),
        // Constructors reject unary operators in binary position
        SymbolicOp::Neg | SymbolicOp::Not => l.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_nodes_translated_once() -> crate::Result<()> {
        let x = SymExpr::variable("x", 8)?;
        let sum = SymExpr::binary(SymbolicOp::Add, x.clone(), x.clone())?;
        let both = SymExpr::binary(SymbolicOp::Mul, sum.clone(), sum)?;

        let mut translator = Translator::new();
        translator.translate(&both).map_err(crate::Error::Solver)?;
        // x, x + x and the product
        assert_eq!(translator.nodes.len(), 3);
        assert_eq!(translator.vars.len(), 1);
        Ok(())
    }

    #[test]
    fn test_width_conflict_rejected() -> crate::Result<()> {
        let narrow = SymExpr::variable("v", 8)?;
        let wide = SymExpr::variable("v", 16)?;
        let mut translator = Translator::new();
        assert!(translator.translate(&narrow).is_ok());
        assert!(matches!(
            translator.translate(&wide),
            Err(SolverError::Unknown(_))
        ));
        Ok(())
    }

    #[test]
    fn test_non_boolean_assertion_rejected() -> crate::Result<()> {
        let x = SymExpr::variable("x", 8)?;
        let mut translator = Translator::new();
        assert!(translator.assertion(&x).is_err());
        Ok(())
    }

    #[test]
    fn test_deep_chain_translated() -> crate::Result<()> {
        let y = SymExpr::variable("y", 64)?;
        let mut chain = SymExpr::variable("x", 64)?;
        for _ in 0..100_000 {
            chain = SymExpr::binary(SymbolicOp::Add, chain, y.clone())?;
        }

        let mut translator = Translator::new();
        translator.translate(&chain).map_err(crate::Error::Solver)?;
        // x, y and one node per addition
        assert_eq!(translator.nodes.len(), 100_002);
        assert_eq!(translator.vars.len(), 2);
        Ok(())
    }
}
