//! Hook definition.

use std::{fmt, sync::Arc};

use crate::{state::ExecutionState, Result};

/// A summary effect: consumes the state at the hooked address and returns its
/// successors.
///
/// Returning an empty vector suppresses the path. Returned states continue at
/// whatever instruction pointer the summary leaves them on.
pub type SummaryFn = dyn Fn(ExecutionState) -> Result<Vec<ExecutionState>> + Send + Sync;

/// A summary bound to one code address.
///
/// # Examples
///
/// ```rust
/// use symscope::assembly::Register;
/// use symscope::hook::Hook;
/// use symscope::symbolic::SymExpr;
///
/// // Pretend the routine at 0x2000 always returns 1
/// let hook = Hook::new("always_one", 0x2000, |mut state| {
///     state.write_register(Register::R0, SymExpr::word(1));
///     let ret = state.concrete_register(Register::Lr)?;
///     state.set_ip(ret);
///     Ok(vec![state])
/// });
/// assert_eq!(hook.address(), 0x2000);
/// assert_eq!(hook.name(), "always_one");
/// ```
#[derive(Clone)]
pub struct Hook {
    name: String,
    address: u64,
    summary: Arc<SummaryFn>,
}

impl Hook {
    /// Creates a hook at `address`.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, address: u64, summary: F) -> Self
    where
        F: Fn(ExecutionState) -> Result<Vec<ExecutionState>> + Send + Sync + 'static,
    {
        Hook {
            name: name.into(),
            address,
            summary: Arc::new(summary),
        }
    }

    /// Name used in logs and error reasons.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hooked address.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Runs the summary on `state`.
    ///
    /// # Errors
    ///
    /// Propagates whatever error the summary returns.
    pub fn apply(&self, state: ExecutionState) -> Result<Vec<ExecutionState>> {
        (self.summary)(state)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("address", &format_args!("{:#x}", self.address))
            .finish_non_exhaustive()
    }
}
