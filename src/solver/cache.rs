//! Satisfiability cache and solver statistics.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::state::ConstraintDigest;

/// Concurrent map from constraint-set digest to satisfiability.
///
/// Only definite answers are stored. Timeouts and unknown results are never cached, so
/// a later query with a larger budget can still decide the set.
pub(crate) struct SatCache {
    entries: DashMap<ConstraintDigest, bool>,
    capacity: usize,
}

impl SatCache {
    pub(crate) fn new(capacity: usize) -> Self {
        SatCache {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, digest: &ConstraintDigest) -> Option<bool> {
        self.entries.get(digest).map(|entry| *entry)
    }

    pub(crate) fn insert(&self, digest: ConstraintDigest, satisfiable: bool) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            log::debug!("solver cache full ({} entries), flushing", self.entries.len());
            self.entries.clear();
        }
        self.entries.insert(digest, satisfiable);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

#[derive(Default)]
pub(crate) struct SolverCounters {
    pub(crate) queries: AtomicU64,
    pub(crate) fast_path: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) solver_calls: AtomicU64,
    pub(crate) timeouts: AtomicU64,
    pub(crate) unknowns: AtomicU64,
}

impl SolverCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, cache_entries: usize) -> SolverStats {
        SolverStats {
            queries: self.queries.load(Ordering::Relaxed),
            fast_path: self.fast_path.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            solver_calls: self.solver_calls.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            unknowns: self.unknowns.load(Ordering::Relaxed),
            cache_entries,
        }
    }
}

/// Point-in-time solver statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Queries received, of any kind.
    pub queries: u64,
    /// Queries answered without the backend or the cache.
    pub fast_path: u64,
    /// Satisfiability queries answered from the cache.
    pub cache_hits: u64,
    /// Queries that reached the SMT backend.
    pub solver_calls: u64,
    /// Backend calls that ran out of time.
    pub timeouts: u64,
    /// Backend calls that returned unknown for another reason.
    pub unknowns: u64,
    /// Entries currently cached.
    pub cache_entries: usize,
}

impl SolverStats {
    /// Fraction of satisfiability queries served from the cache.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.solver_calls;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

impl fmt::Display for SolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} queries ({} fast, {} cached, {} solved, {} timeouts, {} unknown)",
            self.queries,
            self.fast_path,
            self.cache_hits,
            self.solver_calls,
            self.timeouts,
            self.unknowns
        )
    }
}
