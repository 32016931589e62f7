//! Address hooks that replace instructions with summary effects.
//!
//! A hook binds a code address to a closure that takes the state arriving there and
//! returns its successors directly. The stepper checks the [`HookTable`] before it
//! decodes anything, so a hooked address is never decoded or executed no matter how
//! often it is reached.
//!
//! Hooks are how expensive or irrelevant routines (library calls, checksums,
//! anti-analysis checks) are cut out of the search: a summary is cheap, produces a
//! known effect, and keeps the state count from growing inside code nobody cares
//! about.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | The [`Hook`] type and [`SummaryFn`] signature |
//! | `table` | [`HookTable`] registration and lookup |
//! | [`summaries`] | Built-in summaries for common library routines |
//!
//! # Examples
//!
//! ```rust
//! use symscope::hook::{summaries, HookTable};
//!
//! let mut hooks = HookTable::new();
//! hooks.insert(summaries::return_value("is_debugger_present", 0x3000, 0));
//! hooks.insert(summaries::abort("exit", 0x3100));
//! hooks.register(0x3200, |state| Ok(vec![state]));
//! assert_eq!(hooks.len(), 3);
//! ```

mod core;
pub mod summaries;
mod table;

pub use self::core::{Hook, SummaryFn};
pub use table::HookTable;
