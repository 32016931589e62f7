//! Visited-address history.
//!
//! The history is a persistent list that forks share: each state only adds its own
//! nodes on top of the parent's tail. A copy-on-write visit counter sits alongside
//! so loop bounds are checked without walking the list.

use std::sync::Arc;

use imbl::HashMap as ImHashMap;

#[derive(Debug)]
struct HistoryNode {
    address: u64,
    prev: Option<Arc<HistoryNode>>,
}

/// Ordered record of the instruction addresses a path has executed.
#[derive(Debug, Clone, Default)]
pub struct History {
    tail: Option<Arc<HistoryNode>>,
    len: usize,
    visits: ImHashMap<u64, u32>,
}

impl History {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `address` and returns how often it has been visited, including now.
    pub fn record(&mut self, address: u64) -> u32 {
        self.tail = Some(Arc::new(HistoryNode {
            address,
            prev: self.tail.take(),
        }));
        self.len += 1;

        let count = self.visits.get(&address).copied().unwrap_or(0).saturating_add(1);
        self.visits.insert(address, count);
        count
    }

    /// Number of recorded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most recently recorded address.
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.tail.as_ref().map(|node| node.address)
    }

    /// Number of times `address` was visited.
    #[must_use]
    pub fn visits(&self, address: u64) -> u32 {
        self.visits.get(&address).copied().unwrap_or(0)
    }

    /// Highest visit count of any single address.
    #[must_use]
    pub fn max_visits(&self) -> u32 {
        self.visits.values().copied().max().unwrap_or(0)
    }

    /// All visit counts.
    pub fn visit_counts(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.visits.iter().map(|(a, c)| (*a, *c))
    }

    /// Recorded addresses, oldest first.
    #[must_use]
    pub fn addresses(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            out.push(node.address);
            cursor = node.prev.as_deref();
        }
        out.reverse();
        out
    }
}

impl Drop for History {
    fn drop(&mut self) {
        // Unlink iteratively so long paths do not recurse once per node
        let mut cursor = self.tail.take();
        while let Some(node) = cursor {
            match Arc::try_unwrap(node) {
                Ok(mut owned) => cursor = owned.prev.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_visits() {
        let mut history = History::new();
        assert!(history.is_empty());
        assert_eq!(history.record(0x10), 1);
        assert_eq!(history.record(0x14), 1);
        assert_eq!(history.record(0x10), 2);

        assert_eq!(history.len(), 3);
        assert_eq!(history.last(), Some(0x10));
        assert_eq!(history.visits(0x10), 2);
        assert_eq!(history.visits(0x99), 0);
        assert_eq!(history.max_visits(), 2);
        assert_eq!(history.addresses(), vec![0x10, 0x14, 0x10]);
    }

    #[test]
    fn test_forks_share_prefix() {
        let mut parent = History::new();
        parent.record(1);
        parent.record(2);

        let mut child = parent.clone();
        child.record(3);
        parent.record(4);

        assert_eq!(parent.addresses(), vec![1, 2, 4]);
        assert_eq!(child.addresses(), vec![1, 2, 3]);
        assert_eq!(child.visits(4), 0);
    }

    #[test]
    fn test_long_history_drops() {
        let mut history = History::new();
        for i in 0..200_000 {
            history.record(i % 7);
        }
        assert_eq!(history.len(), 200_000);
        drop(history);
    }
}
