//! Path constraint sets.

use imbl::Vector;
use sha1::{Digest, Sha1};

use crate::{symbolic::SymExpr, Error, Result};

/// Canonical digest of a constraint sequence.
pub type ConstraintDigest = [u8; 20];

/// Ordered conjunction of 1-bit expressions that must all hold on a path.
///
/// Constraints are only ever appended. Each append extends a SHA-1 chain over a
/// canonical encoding of the new constraint, so two sets share a digest exactly when
/// they hold structurally equal constraints in the same order. The solver uses the
/// digest as its cache key.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    items: Vector<SymExpr>,
    digest: ConstraintDigest,
}

impl ConstraintSet {
    /// Creates an empty, trivially satisfiable set.
    #[must_use]
    pub fn new() -> Self {
        ConstraintSet {
            items: Vector::new(),
            digest: Sha1::digest(b"symscope.constraints").into(),
        }
    }

    /// Builds a set from a sequence of constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if any constraint is not 1 bit wide.
    pub fn from_constraints(constraints: impl IntoIterator<Item = SymExpr>) -> Result<Self> {
        let mut set = Self::new();
        for constraint in constraints {
            set.push(constraint)?;
        }
        Ok(set)
    }

    /// Appends a constraint.
    ///
    /// The constant `1` is never stored since it cannot change satisfiability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if `constraint` is not 1 bit wide.
    pub fn push(&mut self, constraint: SymExpr) -> Result<()> {
        if constraint.width() != 1 {
            return Err(Error::WidthMismatch {
                operation: "constraint",
                expected: 1,
                found: constraint.width(),
            });
        }
        if constraint.is_true() {
            return Ok(());
        }

        let mut encoded = Vec::new();
        constraint.encode_canonical(&mut encoded);

        let mut hasher = Sha1::new();
        hasher.update(self.digest);
        hasher.update((encoded.len() as u64).to_le_bytes());
        hasher.update(&encoded);
        self.digest = hasher.finalize().into();
        self.items.push_back(constraint);
        Ok(())
    }

    /// Number of stored constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks if no constraints are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SymExpr> {
        self.items.iter()
    }

    /// The chained digest identifying this sequence.
    #[must_use]
    pub fn digest(&self) -> ConstraintDigest {
        self.digest
    }

    /// Checks if a constant `0` constraint makes the set unsatisfiable outright.
    #[must_use]
    pub fn is_trivially_false(&self) -> bool {
        self.items.iter().any(SymExpr::is_false)
    }

    /// Checks if every constraint is constant, so no solver call is needed.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.items.iter().all(SymExpr::is_const)
    }

    /// Checks if `constraint` is stored, by structural equality.
    #[must_use]
    pub fn contains(&self, constraint: &SymExpr) -> bool {
        self.items.iter().any(|c| c == constraint)
    }

    /// Checks if this set starts with every constraint of `other`, in order.
    #[must_use]
    pub fn extends(&self, other: &Self) -> bool {
        other.len() <= self.len() && self.items.iter().zip(other.iter()).all(|(a, b)| a == b)
    }

    /// Length of the longest common prefix of two sets.
    #[must_use]
    pub fn common_prefix_len(&self, other: &Self) -> usize {
        self.items
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Constraints from position `start` onward.
    #[must_use]
    pub fn suffix(&self, start: usize) -> Vec<SymExpr> {
        self.items.iter().skip(start).cloned().collect()
    }
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ConstraintSet {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.items == other.items
    }
}

impl Eq for ConstraintSet {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::SymbolicOp;

    fn lt(name: &str, bound: u8) -> Result<SymExpr> {
        SymExpr::binary(
            SymbolicOp::LtU,
            SymExpr::variable(name, 8)?,
            SymExpr::byte(bound),
        )
    }

    #[test]
    fn test_digest_is_canonical() -> Result<()> {
        let a = ConstraintSet::from_constraints([lt("x", 10)?, lt("y", 20)?])?;
        let b = ConstraintSet::from_constraints([lt("x", 10)?, lt("y", 20)?])?;
        let c = ConstraintSet::from_constraints([lt("y", 20)?, lt("x", 10)?])?;

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_ne!(a.digest(), ConstraintSet::new().digest());
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_true_is_dropped() -> Result<()> {
        let mut set = ConstraintSet::new();
        let before = set.digest();
        set.push(SymExpr::truth(true))?;
        assert!(set.is_empty());
        assert_eq!(set.digest(), before);

        set.push(SymExpr::truth(false))?;
        assert!(set.is_trivially_false());
        assert!(set.is_concrete());
        Ok(())
    }

    #[test]
    fn test_rejects_wide_constraint() {
        let mut set = ConstraintSet::new();
        assert!(matches!(
            set.push(SymExpr::byte(1)),
            Err(Error::WidthMismatch { .. })
        ));
    }

    #[test]
    fn test_prefix_relations() -> Result<()> {
        let parent = ConstraintSet::from_constraints([lt("x", 10)?])?;
        let mut left = parent.clone();
        left.push(lt("y", 1)?)?;
        let mut right = parent.clone();
        right.push(lt("z", 2)?)?;

        assert!(left.extends(&parent));
        assert!(!parent.extends(&left));
        assert_eq!(left.common_prefix_len(&right), 1);
        assert_eq!(left.suffix(1), vec![lt("y", 1)?]);
        assert!(left.contains(&lt("x", 10)?));
        Ok(())
    }

    #[test]
    fn test_digest_follows_structure() -> Result<()> {
        let (x, y) = (SymExpr::variable("x", 8)?, SymExpr::variable("y", 8)?);
        let sum_lt = |lhs: &SymExpr, rhs: &SymExpr| -> Result<SymExpr> {
            SymExpr::binary(
                SymbolicOp::LtU,
                SymExpr::binary(SymbolicOp::Add, lhs.clone(), rhs.clone())?,
                SymExpr::byte(10),
            )
        };

        let xy = ConstraintSet::from_constraints([sum_lt(&x, &y)?])?;
        let yx = ConstraintSet::from_constraints([sum_lt(&y, &x)?])?;
        assert_ne!(xy.digest(), yx.digest());

        // Sharing a subtree or rebuilding it yields the same digest
        let sum = SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?;
        let square_lt = |lhs: SymExpr, rhs: SymExpr| -> Result<SymExpr> {
            SymExpr::binary(
                SymbolicOp::LtU,
                SymExpr::binary(SymbolicOp::Mul, lhs, rhs)?,
                SymExpr::byte(10),
            )
        };
        let shared = square_lt(sum.clone(), sum)?;
        let rebuilt = square_lt(
            SymExpr::binary(SymbolicOp::Add, x.clone(), y.clone())?,
            SymExpr::binary(SymbolicOp::Add, x, y)?,
        )?;
        assert_eq!(
            ConstraintSet::from_constraints([shared])?.digest(),
            ConstraintSet::from_constraints([rebuilt])?.digest()
        );
        Ok(())
    }
}
