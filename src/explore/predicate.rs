//! Find and avoid predicates.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{state::ExecutionState, Error, Result};

/// Classifier closure for [`StatePredicate::Custom`].
pub type PredicateFn = dyn Fn(&ExecutionState) -> bool + Send + Sync;

/// Decides whether a state belongs to the find or the avoid set.
///
/// # Examples
///
/// ```rust
/// use symscope::explore::StatePredicate;
///
/// let find = StatePredicate::addresses([0x1040]);
/// let avoid = StatePredicate::custom(|state| state.steps() > 500);
/// assert!(StatePredicate::check_disjoint(&find, &avoid).is_ok());
/// ```
#[derive(Clone, Default)]
pub enum StatePredicate {
    /// Matches nothing.
    #[default]
    Never,
    /// Matches states whose instruction pointer is in the set.
    Addresses(BTreeSet<u64>),
    /// Matches states the closure accepts.
    Custom(Arc<PredicateFn>),
}

impl StatePredicate {
    /// Predicate matching any of `addresses`.
    pub fn addresses(addresses: impl IntoIterator<Item = u64>) -> Self {
        StatePredicate::Addresses(addresses.into_iter().collect())
    }

    /// Predicate backed by a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ExecutionState) -> bool + Send + Sync + 'static,
    {
        StatePredicate::Custom(Arc::new(f))
    }

    /// Checks if `state` matches.
    #[must_use]
    pub fn matches(&self, state: &ExecutionState) -> bool {
        match self {
            StatePredicate::Never => false,
            StatePredicate::Addresses(set) => set.contains(&state.ip()),
            StatePredicate::Custom(f) => f(state),
        }
    }

    /// Rejects address predicates that share an address.
    ///
    /// Closures cannot be compared, so only two address sets are checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContradictoryPredicates`] with the lowest shared address.
    pub fn check_disjoint(find: &Self, avoid: &Self) -> Result<()> {
        if let (StatePredicate::Addresses(f), StatePredicate::Addresses(a)) = (find, avoid) {
            if let Some(address) = f.intersection(a).next() {
                return Err(Error::ContradictoryPredicates { address: *address });
            }
        }
        Ok(())
    }
}

impl From<u64> for StatePredicate {
    fn from(address: u64) -> Self {
        StatePredicate::addresses([address])
    }
}

impl fmt::Debug for StatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatePredicate::Never => f.write_str("Never"),
            StatePredicate::Addresses(set) => f
                .debug_tuple("Addresses")
                .field(&format_args!("{set:#x?}"))
                .finish(),
            StatePredicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::Program, state::UninitializedMemory};

    #[test]
    fn test_matches() -> Result<()> {
        let image = Arc::new(Program::new(0x100).with_code(0x100, vec![0x0C; 4])?);
        let state = ExecutionState::new(image, UninitializedMemory::Zero);

        assert!(!StatePredicate::Never.matches(&state));
        assert!(StatePredicate::from(0x100).matches(&state));
        assert!(!StatePredicate::addresses([0x104, 0x108]).matches(&state));
        assert!(StatePredicate::custom(|s| s.steps() == 0).matches(&state));
        Ok(())
    }

    #[test]
    fn test_contradictory_addresses() {
        let find = StatePredicate::addresses([0x10, 0x20]);
        let avoid = StatePredicate::addresses([0x20, 0x30]);
        assert!(matches!(
            StatePredicate::check_disjoint(&find, &avoid),
            Err(Error::ContradictoryPredicates { address: 0x20 })
        ));
        assert!(StatePredicate::check_disjoint(&find, &StatePredicate::custom(|_| true)).is_ok());
        assert!(StatePredicate::check_disjoint(&StatePredicate::Never, &avoid).is_ok());
    }
}
