//! Address-keyed hook registry.

use std::collections::BTreeMap;

use crate::{hook::core::Hook, state::ExecutionState, Result};

/// Mapping from code address to [`Hook`].
///
/// Built once before exploration and shared read-only with every worker; the
/// stepper consults it before decoding each instruction. At most one hook exists
/// per address.
///
/// # Examples
///
/// ```rust,ignore
/// use symscope::hook::{summaries, HookTable};
///
/// let mut hooks = HookTable::new();
/// hooks.insert(summaries::return_value("check_license", 0x4000, 1));
/// hooks.insert(summaries::abort("exit", 0x4100));
///
/// let hooks = Arc::new(hooks);
/// ```
#[derive(Default, Debug, Clone)]
pub struct HookTable {
    hooks: BTreeMap<u64, Hook>,
}

impl HookTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a summary at `address` under a generated name.
    ///
    /// Returns the hook it replaced, if any.
    pub fn register<F>(&mut self, address: u64, summary: F) -> Option<Hook>
    where
        F: Fn(ExecutionState) -> Result<Vec<ExecutionState>> + Send + Sync + 'static,
    {
        self.insert(Hook::new(format!("hook_{address:#x}"), address, summary))
    }

    /// Registers a prepared hook at its own address.
    ///
    /// Returns the hook it replaced, if any.
    pub fn insert(&mut self, hook: Hook) -> Option<Hook> {
        let replaced = self.hooks.insert(hook.address(), hook);
        if let Some(old) = &replaced {
            log::warn!(
                "hook '{}' at {:#x} replaced by a new registration",
                old.name(),
                old.address()
            );
        }
        replaced
    }

    /// Removes the hook at `address`.
    pub fn remove(&mut self, address: u64) -> Option<Hook> {
        self.hooks.remove(&address)
    }

    /// The hook registered at `address`.
    #[must_use]
    pub fn lookup(&self, address: u64) -> Option<&Hook> {
        self.hooks.get(&address)
    }

    /// Checks if `address` is hooked.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        self.hooks.contains_key(&address)
    }

    /// Number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Checks if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hooks in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::Register, image::Program, state::UninitializedMemory, symbolic::SymExpr};
    use std::sync::Arc;

    #[test]
    fn test_register_and_lookup() {
        let mut table = HookTable::new();
        assert!(table.is_empty());
        assert!(table.register(0x10, |s| Ok(vec![s])).is_none());

        assert_eq!(table.len(), 1);
        assert!(table.contains(0x10));
        assert_eq!(table.lookup(0x10).map(Hook::name), Some("hook_0x10"));
        assert!(table.lookup(0x11).is_none());
    }

    #[test]
    fn test_reregistration_replaces() -> crate::Result<()> {
        let mut table = HookTable::new();
        table.insert(Hook::new("first", 0x20, |s| Ok(vec![s])));
        let old = table.insert(Hook::new("second", 0x20, |mut s| {
            s.write_register(Register::R0, SymExpr::word(2));
            Ok(vec![s])
        }));
        assert_eq!(old.map(|h| h.name().to_string()).as_deref(), Some("first"));
        assert_eq!(table.len(), 1);

        let program = Program::new(0x20).with_code(0x20, vec![0x0C])?;
        let state = crate::state::ExecutionState::new(Arc::new(program), UninitializedMemory::Zero);
        let Some(hook) = table.lookup(0x20) else {
            panic!("hook missing");
        };
        let out = hook.apply(state)?;
        assert_eq!(out[0].read_register(Register::R0).as_const(), Some(2));
        Ok(())
    }

    #[test]
    fn test_iter_in_address_order() {
        let mut table = HookTable::new();
        table.register(0x30, |s| Ok(vec![s]));
        table.register(0x10, |_| Ok(Vec::new()));
        let addresses: Vec<u64> = table.iter().map(Hook::address).collect();
        assert_eq!(addresses, vec![0x10, 0x30]);
        assert!(table.remove(0x10).is_some());
        assert_eq!(table.len(), 1);
    }
}
