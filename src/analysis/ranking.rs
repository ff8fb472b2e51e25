//! Capacity-bounded ranking
//!
//! Keeps the `capacity` greatest entries seen during a single forward pass
//! without retaining the rest of the stream. Entries are ordered by their
//! `Ord` impl; the minimum lives at the front of the set so eviction is a
//! `pop_first`.
//!
//! The ordering MUST be a strict total order over distinct entries. A
//! comparator on size alone makes two different keys of the same size
//! compare `Equal`, and the set would silently keep only one of them. The
//! entry types in this crate pair the size with a unique tiebreak
//! (sequence number or prefix string) for that reason.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::iter::Rev;

/// Fixed-capacity top-K selector
#[derive(Debug, Clone)]
pub struct BoundedRanking<T> {
    entries: BTreeSet<T>,
    capacity: usize,
}

impl<T: Ord> BoundedRanking<T> {
    /// Verify all invariants hold for this ranking
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        debug_assert!(self.capacity >= 1, "Invariant violated: capacity must be >= 1");
        debug_assert!(
            self.entries.len() <= self.capacity,
            "Invariant violated: holding {} entries but capacity is {}",
            self.entries.len(),
            self.capacity
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    /// Create a ranking that holds at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 1, "Precondition: capacity must be >= 1");
        BoundedRanking {
            entries: BTreeSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Offer an entry. Returns `true` if the entry is now held.
    ///
    /// Below capacity the entry is always kept. At capacity it replaces
    /// the current minimum only if it ranks strictly higher.
    #[inline]
    pub fn insert(&mut self, entry: T) -> bool {
        if self.entries.len() < self.capacity {
            let inserted = self.entries.insert(entry);
            self.verify_invariants();
            return inserted;
        }

        let outranks_min = match self.entries.first() {
            Some(min) => entry > *min,
            None => true,
        };
        if !outranks_min {
            return false;
        }

        self.entries.pop_first();
        let inserted = self.entries.insert(entry);
        self.verify_invariants();
        inserted
    }

    /// Lowest-ranked entry currently held
    pub fn min(&self) -> Option<&T> {
        self.entries.first()
    }

    /// Highest-ranked entry currently held
    pub fn max(&self) -> Option<&T> {
        self.entries.last()
    }

    /// Held entries from highest to lowest rank.
    ///
    /// Borrowing iteration; calling it again yields the same sequence.
    pub fn iter(&self) -> Rev<btree_set::Iter<'_, T>> {
        self.entries.iter().rev()
    }

    /// Consume the ranking, returning entries from highest to lowest rank
    pub fn into_sorted_vec(self) -> Vec<T> {
        self.entries.into_iter().rev().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'a, T: Ord> IntoIterator for &'a BoundedRanking<T> {
    type Item = &'a T;
    type IntoIter = Rev<btree_set::Iter<'a, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cmp::Ordering;

    /// Size plus unique id, the shape every real entry type follows
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Entry {
        size: u64,
        id: u64,
    }

    impl Ord for Entry {
        fn cmp(&self, other: &Self) -> Ordering {
            self.size
                .cmp(&other.size)
                .then_with(|| other.id.cmp(&self.id))
        }
    }

    impl PartialOrd for Entry {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    fn entry(size: u64, id: u64) -> Entry {
        Entry { size, id }
    }

    #[test]
    fn test_below_capacity_keeps_everything() {
        let mut ranking = BoundedRanking::new(10);
        for i in 0..5 {
            assert!(ranking.insert(entry(i, i)));
        }
        assert_eq!(ranking.len(), 5);
        assert_eq!(ranking.min(), Some(&entry(0, 0)));
        assert_eq!(ranking.max(), Some(&entry(4, 4)));
    }

    #[test]
    fn test_evicts_minimum_when_full() {
        let mut ranking = BoundedRanking::new(3);
        ranking.insert(entry(10, 1));
        ranking.insert(entry(20, 2));
        ranking.insert(entry(30, 3));

        assert!(!ranking.insert(entry(5, 4)));
        assert!(ranking.insert(entry(25, 5)));

        let sizes: Vec<u64> = ranking.iter().map(|e| e.size).collect();
        assert_eq!(sizes, vec![30, 25, 20]);
    }

    #[test]
    fn test_equal_sizes_are_distinct_entries() {
        let mut ranking = BoundedRanking::new(4);
        for id in 0..4 {
            assert!(ranking.insert(entry(100, id)));
        }
        assert_eq!(ranking.len(), 4);

        // Same size, later id ranks lower than everything held
        assert!(!ranking.insert(entry(100, 99)));
        assert_eq!(ranking.len(), 4);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut ranking = BoundedRanking::new(5);
        for i in 0..8 {
            ranking.insert(entry(i * 3, i));
        }
        let first: Vec<_> = ranking.iter().copied().collect();
        let second: Vec<_> = ranking.iter().copied().collect();
        assert_eq!(first, second);
        assert_eq!(ranking.len(), 5);
        assert_eq!(first, ranking.clone().into_sorted_vec());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        // debug_assert fires on 0 in debug builds, so only exercise it in release
        if cfg!(debug_assertions) {
            return;
        }
        let mut ranking = BoundedRanking::new(0);
        assert_eq!(ranking.capacity(), 1);
        ranking.insert(entry(1, 1));
        ranking.insert(entry(2, 2));
        assert_eq!(ranking.len(), 1);
    }

    #[test]
    fn test_final_contents_independent_of_insertion_order() {
        let entries: Vec<Entry> = (0..500u64).map(|i| entry(i % 97, i)).collect();

        let mut expected = entries.clone();
        expected.sort_by(|a, b| b.cmp(a));
        expected.truncate(40);

        for seed in 0..25u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut shuffled = entries.clone();
            shuffled.shuffle(&mut rng);

            let mut ranking = BoundedRanking::new(40);
            for entry in shuffled {
                ranking.insert(entry);
            }
            assert_eq!(
                ranking.into_sorted_vec(),
                expected,
                "seed {} produced a different top-K",
                seed
            );
        }
    }
}
