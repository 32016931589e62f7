//! Solver configuration.

/// Settings for the constraint solver adapter.
///
/// # Default Values
///
/// | Setting | Default |
/// |---------|---------|
/// | `timeout_ms` | 5 000 |
/// | `cache_results` | `true` |
/// | `max_cache_entries` | 65 536 |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    /// Time budget for a single query in milliseconds, 0 for none.
    ///
    /// Queries that run out of time report [`crate::solver::SolverError::Timeout`];
    /// the affected state is classified as errored instead of being dropped.
    pub timeout_ms: u32,

    /// Whether satisfiability results are cached by constraint-set digest.
    pub cache_results: bool,

    /// Upper bound on cached results; the cache is flushed when it fills up.
    pub max_cache_entries: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            timeout_ms: 5_000,
            cache_results: true,
            max_cache_entries: 65_536,
        }
    }
}

impl SolverConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-query time budget.
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u32) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Enables or disables result caching.
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub fn with_max_cache_entries(mut self, max: usize) -> Self {
        self.max_cache_entries = max;
        self
    }
}
