//! Step counters and exploration budget checks.
//!
//! [`ExecutionStats`] tracks the global step count and wall clock of one exploration
//! run and reports the first exhausted budget as a [`LimitExceeded`]. Per-path
//! bounds (path steps, loop unrolling) are classification rules in the scheduler,
//! not budgets.
//!
//! For configurable limits, see [`crate::explore::ExplorationLimits`].

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use crate::explore::ExplorationLimits;

/// Tracks global step count and elapsed time for budget checks.
#[derive(Clone, Debug, Default)]
pub struct ExecutionStats {
    /// Steps taken across all paths.
    pub steps_executed: u64,

    start_time: Option<Instant>,
}

impl ExecutionStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        ExecutionStats {
            steps_executed: 0,
            start_time: None,
        }
    }

    /// Marks the start of the run.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Adds `count` steps.
    pub fn add_steps(&mut self, count: u64) {
        self.steps_executed += count;
    }

    /// Time since [`ExecutionStats::start`].
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|t| t.elapsed())
    }

    /// Checks if the global step budget is used up.
    #[must_use]
    pub fn step_limit_exceeded(&self, limits: &ExplorationLimits) -> bool {
        limits.max_total_steps != 0 && self.steps_executed >= limits.max_total_steps
    }

    /// Checks if the wall-clock budget is used up.
    #[must_use]
    pub fn timeout_exceeded(&self, limits: &ExplorationLimits) -> bool {
        if limits.timeout_ms == 0 {
            return false;
        }
        let timeout = Duration::from_millis(limits.timeout_ms);
        self.elapsed().is_some_and(|e| e >= timeout)
    }

    /// Returns the first exhausted budget, if any.
    #[must_use]
    pub fn check_limits(&self, limits: &ExplorationLimits) -> Option<LimitExceeded> {
        if self.step_limit_exceeded(limits) {
            Some(LimitExceeded::Steps {
                executed: self.steps_executed,
                limit: limits.max_total_steps,
            })
        } else if self.timeout_exceeded(limits) {
            Some(LimitExceeded::Timeout {
                elapsed: self.elapsed().unwrap_or_default(),
                limit: Duration::from_millis(limits.timeout_ms),
            })
        } else {
            None
        }
    }
}

/// Which global budget ended an exploration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitExceeded {
    /// Global step budget.
    Steps {
        /// Steps taken.
        executed: u64,
        /// Maximum allowed.
        limit: u64,
    },

    /// Wall-clock budget.
    Timeout {
        /// Time elapsed.
        elapsed: Duration,
        /// Timeout limit.
        limit: Duration,
    },
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitExceeded::Steps { executed, limit } => {
                write!(f, "step limit exceeded: {executed} (limit: {limit})")
            }
            LimitExceeded::Timeout { elapsed, limit } => {
                write!(f, "timeout exceeded: {elapsed:?} (limit: {limit:?})")
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct StepCounters {
    pub(crate) instructions: AtomicU64,
    pub(crate) hooks: AtomicU64,
    pub(crate) forks: AtomicU64,
    pub(crate) infeasible: AtomicU64,
    pub(crate) errors: AtomicU64,
}

impl StepCounters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StepStats {
        StepStats {
            instructions: self.instructions.load(Ordering::Relaxed),
            hooks: self.hooks.load(Ordering::Relaxed),
            forks: self.forks.load(Ordering::Relaxed),
            infeasible: self.infeasible.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Counters collected by a [`crate::engine::Stepper`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Instructions decoded and executed.
    pub instructions: u64,
    /// Hook summaries applied in place of instructions.
    pub hooks: u64,
    /// Extra successors created at branches and address enumerations.
    pub forks: u64,
    /// Candidate successors dropped as unsatisfiable.
    pub infeasible: u64,
    /// Successors classified as errored.
    pub errors: u64,
}

impl fmt::Display for StepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} instructions, {} hooks, {} forks, {} infeasible, {} errors",
            self.instructions, self.hooks, self.forks, self.infeasible, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_stats_new() {
        let stats = ExecutionStats::new();
        assert_eq!(stats.steps_executed, 0);
        assert!(stats.elapsed().is_none());
    }

    #[test]
    fn test_step_limit_check() {
        let limits = ExplorationLimits::new().with_max_total_steps(100);
        let mut stats = ExecutionStats::new();
        stats.start();

        stats.add_steps(99);
        assert!(stats.check_limits(&limits).is_none());

        stats.add_steps(1);
        assert_eq!(
            stats.check_limits(&limits),
            Some(LimitExceeded::Steps {
                executed: 100,
                limit: 100
            })
        );
    }

    #[test]
    fn test_zero_means_unlimited() {
        let limits = ExplorationLimits::new()
            .with_max_total_steps(0)
            .with_timeout_ms(0);
        let mut stats = ExecutionStats::new();
        stats.start();
        stats.add_steps(u64::from(u32::MAX));
        assert!(stats.check_limits(&limits).is_none());
    }

    #[test]
    fn test_timeout_check() {
        let limits = ExplorationLimits::new()
            .with_max_total_steps(0)
            .with_timeout_ms(1);
        let mut stats = ExecutionStats::new();
        assert!(!stats.timeout_exceeded(&limits));

        stats.start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            stats.check_limits(&limits),
            Some(LimitExceeded::Timeout { .. })
        ));
    }

    #[test]
    fn test_limit_display() {
        let limit = LimitExceeded::Steps {
            executed: 1000,
            limit: 1000,
        };
        assert_eq!(limit.to_string(), "step limit exceeded: 1000 (limit: 1000)");
    }
}
