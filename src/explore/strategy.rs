//! Search strategies.
//!
//! A strategy only picks indices into the active queue; the explorer owns the queue
//! and does all bookkeeping. New states are always appended at the back, so the
//! queue is ordered oldest to newest.

use std::collections::VecDeque;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{explore::config::ExplorationConfig, state::ExecutionState};

/// Chooses which active state the explorer steps next.
pub trait SearchStrategy: Send {
    /// Index of the next state to step, or `None` if `active` is empty.
    fn select(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize>;

    /// Index of the state to give up on when the active population is over its cap.
    ///
    /// Defaults to the oldest state.
    fn evict(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize> {
        if active.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Steps the most recently added state first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFirst;

impl SearchStrategy for DepthFirst {
    fn select(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize> {
        active.len().checked_sub(1)
    }

    fn name(&self) -> &'static str {
        "dfs"
    }
}

/// Steps the oldest state first.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirst;

impl SearchStrategy for BreadthFirst {
    fn select(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize> {
        if active.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn evict(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize> {
        active.len().checked_sub(1)
    }

    fn name(&self) -> &'static str {
        "bfs"
    }
}

/// Picks uniformly among active states with a seeded generator.
///
/// Two explorations started with the same seed and the same initial states make the
/// same choices.
#[derive(Debug, Clone)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    /// Creates a generator seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Random {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a generator seeded from [`ExplorationConfig::seed`].
    #[must_use]
    pub fn from_config(config: &ExplorationConfig) -> Self {
        Self::new(config.seed)
    }
}

impl SearchStrategy for Random {
    fn select(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize> {
        if active.is_empty() {
            None
        } else {
            Some(self.rng.gen_range(0..active.len()))
        }
    }

    fn evict(&mut self, active: &VecDeque<ExecutionState>) -> Option<usize> {
        self.select(active)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{image::Program, state::UninitializedMemory, Result};

    fn queue(len: usize) -> Result<VecDeque<ExecutionState>> {
        let image = Arc::new(Program::new(0x100).with_code(0x100, vec![0x0C])?);
        let root = ExecutionState::new(image, UninitializedMemory::Zero);
        Ok((0..len).map(|_| root.fork()).collect())
    }

    #[test]
    fn test_depth_and_breadth_first() -> Result<()> {
        let active = queue(3)?;
        assert_eq!(DepthFirst.select(&active), Some(2));
        assert_eq!(DepthFirst.evict(&active), Some(0));
        assert_eq!(BreadthFirst.select(&active), Some(0));
        assert_eq!(BreadthFirst.evict(&active), Some(2));

        let empty = VecDeque::new();
        assert_eq!(DepthFirst.select(&empty), None);
        assert_eq!(BreadthFirst.select(&empty), None);
        Ok(())
    }

    #[test]
    fn test_random_is_reproducible() -> Result<()> {
        let active = queue(8)?;
        let picks = |seed| {
            let mut strategy = Random::new(seed);
            (0..16)
                .map(|_| strategy.select(&active))
                .collect::<Vec<_>>()
        };

        let first = picks(7);
        assert_eq!(first, picks(7));
        assert!(first.iter().all(|p| matches!(p, Some(i) if *i < 8)));
        assert_eq!(Random::new(1).select(&VecDeque::new()), None);

        let config = ExplorationConfig::default().with_seed(7);
        let mut from_config = Random::from_config(&config);
        let again: Vec<_> = (0..16).map(|_| from_config.select(&active)).collect();
        assert_eq!(first, again);
        Ok(())
    }
}
