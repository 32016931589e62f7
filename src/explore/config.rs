//! Exploration configuration types.
//!
//! Configuration is organized into several structures:
//!
//! - [`ExplorationConfig`] - Top-level configuration container
//! - [`ExplorationLimits`] - Global budgets and per-path bounds
//! - [`MemoryConfig`] - Symbolic addressing and uninitialized memory
//! - [`crate::solver::SolverConfig`] - Per-query solver settings
//!
//! # Configuration Presets
//!
//! - [`ExplorationConfig::quick()`] - Small budgets for smoke tests and CI
//! - [`ExplorationConfig::thorough()`] - Large budgets, parallel stepping
//! - [`ExplorationConfig::bounded()`] - Only a per-path step bound, no global budget
//!
//! # Example
//!
//! ```rust
//! use symscope::explore::{ExplorationConfig, ExplorationLimits};
//!
//! // Use a preset
//! let config = ExplorationConfig::quick();
//! assert!(config.validate().is_ok());
//!
//! // Or customize
//! let config = ExplorationConfig {
//!     limits: ExplorationLimits::new()
//!         .with_max_total_steps(50_000)
//!         .with_loop_unroll_limit(Some(16)),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::{error::config_error, solver::SolverConfig, state::UninitializedMemory, Result};

/// Complete exploration configuration.
///
/// # Default Configuration
///
/// - 1 million global steps, 1 minute wall clock
/// - 10 000 steps per path, no loop unroll bound
/// - Stop at the first found state
/// - 16 candidates per symbolic address
/// - 5 second solver budget per query
/// - Single-threaded stepping, seed 0
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorationConfig {
    /// Global budgets and per-path bounds.
    pub limits: ExplorationLimits,

    /// Memory model settings.
    pub memory: MemoryConfig,

    /// Solver settings.
    pub solver: SolverConfig,

    /// Active states stepped per scheduler iteration.
    ///
    /// With 1 the scheduler steps exactly the state the strategy selects. Larger
    /// batches are stepped in parallel with rayon and their successors are merged
    /// back in selection order, so results do not depend on thread timing.
    pub batch_size: usize,

    /// Seed for randomized strategies.
    pub seed: u64,
}

/// Global budgets and per-path bounds.
///
/// Global budgets end the whole exploration as inconclusive. Per-path bounds only
/// deadend the path that crosses them.
///
/// # Default Values
///
/// | Limit | Default |
/// |-------|---------|
/// | `max_total_steps` | 1 000 000 |
/// | `timeout_ms` | 60 000 (1 minute) |
/// | `max_path_steps` | 10 000 |
/// | `loop_unroll_limit` | none |
/// | `max_found` | 1 |
/// | `max_active` | none |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorationLimits {
    /// Steps summed over all paths, 0 for unlimited.
    pub max_total_steps: u64,

    /// Wall-clock budget in milliseconds, 0 for unlimited.
    ///
    /// Checked between scheduler iterations; a step in progress is never
    /// interrupted.
    pub timeout_ms: u64,

    /// Steps a single path may take before it is deadended, 0 for unlimited.
    pub max_path_steps: u64,

    /// Times a single path may visit one address before it is deadended.
    pub loop_unroll_limit: Option<u32>,

    /// Found states to collect before stopping.
    pub max_found: usize,

    /// Soft cap on the active population.
    ///
    /// After each iteration, states beyond the cap are deadended, starting with the
    /// ones the search strategy would visit last.
    pub max_active: Option<usize>,
}

/// Memory model settings.
///
/// # Default Values
///
/// | Setting | Default |
/// |---------|---------|
/// | `symbolic_address_cap` | 16 |
/// | `uninitialized` | [`UninitializedMemory::Zero`] |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Most concrete values a symbolic address or jump target may resolve to.
    ///
    /// A state whose address admits more values is errored with
    /// [`crate::engine::ErrorReason::UnconstrainedMemoryAccess`].
    pub symbolic_address_cap: usize,

    /// What reads of never-written, non-image memory return.
    pub uninitialized: UninitializedMemory,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            limits: ExplorationLimits::default(),
            memory: MemoryConfig::default(),
            solver: SolverConfig::default(),
            batch_size: 1,
            seed: 0,
        }
    }
}

impl Default for ExplorationLimits {
    fn default() -> Self {
        Self {
            max_total_steps: 1_000_000,
            timeout_ms: 60_000,
            max_path_steps: 10_000,
            loop_unroll_limit: None,
            max_found: 1,
            max_active: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            symbolic_address_cap: 16,
            uninitialized: UninitializedMemory::Zero,
        }
    }
}

impl ExplorationConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Small budgets for quick checks.
    ///
    /// # Settings
    ///
    /// - **Global steps**: 100 000, **timeout**: 10 seconds
    /// - **Per path**: 5 000 steps, 64 visits per address
    /// - **Solver**: 1 second per query
    #[must_use]
    pub fn quick() -> Self {
        Self {
            limits: ExplorationLimits {
                max_total_steps: 100_000,
                timeout_ms: 10_000,
                max_path_steps: 5_000,
                loop_unroll_limit: Some(64),
                ..Default::default()
            },
            solver: SolverConfig::default().with_timeout_ms(1_000),
            ..Default::default()
        }
    }

    /// Large budgets and parallel stepping for deep searches.
    ///
    /// # Settings
    ///
    /// - **Global steps**: 50 million, **timeout**: 30 minutes
    /// - **Per path**: 1 million steps
    /// - **Symbolic addresses**: up to 256 candidates
    /// - **Solver**: 30 seconds per query
    /// - **Batch**: 16 states per iteration
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            limits: ExplorationLimits {
                max_total_steps: 50_000_000,
                timeout_ms: 30 * 60 * 1000,
                max_path_steps: 1_000_000,
                ..Default::default()
            },
            memory: MemoryConfig {
                symbolic_address_cap: 256,
                ..Default::default()
            },
            solver: SolverConfig::default().with_timeout_ms(30_000),
            batch_size: 16,
            ..Default::default()
        }
    }

    /// Only bounds each path to `max_path_steps`; no global step or time budget.
    ///
    /// Exploration ends when every path has halted, errored, or hit the bound.
    #[must_use]
    pub fn bounded(max_path_steps: u64) -> Self {
        Self {
            limits: ExplorationLimits {
                max_total_steps: 0,
                timeout_ms: 0,
                max_path_steps,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Replaces all limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ExplorationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the number of found states to collect.
    #[must_use]
    pub fn with_max_found(mut self, max: usize) -> Self {
        self.limits.max_found = max;
        self
    }

    /// Sets the global step budget (0 for unlimited).
    #[must_use]
    pub fn with_max_total_steps(mut self, max: u64) -> Self {
        self.limits.max_total_steps = max;
        self
    }

    /// Sets the per-path step bound (0 for unlimited).
    #[must_use]
    pub fn with_max_path_steps(mut self, max: u64) -> Self {
        self.limits.max_path_steps = max;
        self
    }

    /// Sets the wall-clock budget (0 for unlimited).
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.limits.timeout_ms = ms;
        self
    }

    /// Sets the per-address visit bound.
    #[must_use]
    pub fn with_loop_unroll_limit(mut self, limit: Option<u32>) -> Self {
        self.limits.loop_unroll_limit = limit;
        self
    }

    /// Sets the soft cap on active states.
    #[must_use]
    pub fn with_max_active(mut self, max: Option<usize>) -> Self {
        self.limits.max_active = max;
        self
    }

    /// Sets the symbolic address enumeration cap.
    #[must_use]
    pub fn with_symbolic_address_cap(mut self, cap: usize) -> Self {
        self.memory.symbolic_address_cap = cap;
        self
    }

    /// Sets the uninitialized memory policy.
    #[must_use]
    pub fn with_uninitialized(mut self, policy: UninitializedMemory) -> Self {
        self.memory.uninitialized = policy;
        self
    }

    /// Replaces the solver settings.
    #[must_use]
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Sets how many states are stepped per iteration.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the seed for randomized strategies.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Rejects settings under which exploration is meaningless or unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if `max_found`, `batch_size`,
    /// `symbolic_address_cap`, a loop unroll limit or an active cap is zero, or if no
    /// global budget, per-path bound or loop bound limits the run.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.max_found == 0 {
            return Err(config_error!("max_found must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(config_error!("batch_size must be at least 1"));
        }
        if self.memory.symbolic_address_cap == 0 {
            return Err(config_error!("symbolic_address_cap must be at least 1"));
        }
        if limits.loop_unroll_limit == Some(0) {
            return Err(config_error!("loop_unroll_limit must be at least 1"));
        }
        if limits.max_active == Some(0) {
            return Err(config_error!("max_active must be at least 1"));
        }
        if limits.max_total_steps == 0
            && limits.timeout_ms == 0
            && limits.max_path_steps == 0
            && limits.loop_unroll_limit.is_none()
        {
            return Err(config_error!(
                "no step budget, timeout, path bound or loop bound limits the exploration"
            ));
        }
        Ok(())
    }
}

/// Builder methods for [`ExplorationLimits`].
impl ExplorationLimits {
    /// Creates limits with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global step budget (0 for unlimited).
    #[must_use]
    pub fn with_max_total_steps(mut self, max: u64) -> Self {
        self.max_total_steps = max;
        self
    }

    /// Sets the wall-clock budget in milliseconds (0 for unlimited).
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Sets the per-path step bound (0 for unlimited).
    #[must_use]
    pub fn with_max_path_steps(mut self, max: u64) -> Self {
        self.max_path_steps = max;
        self
    }

    /// Sets the per-address visit bound.
    #[must_use]
    pub fn with_loop_unroll_limit(mut self, limit: Option<u32>) -> Self {
        self.loop_unroll_limit = limit;
        self
    }

    /// Sets the number of found states to collect.
    #[must_use]
    pub fn with_max_found(mut self, max: usize) -> Self {
        self.max_found = max;
        self
    }

    /// Sets the soft cap on active states.
    #[must_use]
    pub fn with_max_active(mut self, max: Option<usize>) -> Self {
        self.max_active = max;
        self
    }
}
