//! Key-prefix grouping
//!
//! Two phases: every record updates an unbounded map keyed by prefix while
//! the scan runs, then the finished map is reduced to the `top_n` largest
//! prefixes. The reduction cannot happen online because a prefix's total is
//! unknown until the last record has been seen.

use super::ranking::BoundedRanking;
use ahash::AHashMap;
use std::cmp::Ordering;

/// Bucket for keys that carry no separator
pub const OTHERS_PREFIX: &str = "others";

/// Group name for a key: the key minus its final `separator`-delimited segment.
///
/// Trailing separators left after the cut are trimmed, so `a::b` groups
/// under `a`. Keys without the separator (including the empty key) group
/// under [`OTHERS_PREFIX`]. A key whose only separators lead it, such as
/// `:b`, has an empty head and groups under the empty prefix `""`, not
/// under [`OTHERS_PREFIX`].
pub fn derive_prefix<'a>(key: &'a str, separator: &str) -> &'a str {
    if key.is_empty() || separator.is_empty() {
        return OTHERS_PREFIX;
    }
    match key.rfind(separator) {
        Some(idx) => key[..idx].trim_end_matches(separator),
        None => OTHERS_PREFIX,
    }
}

/// Cumulative size and key count for one prefix
///
/// Ranks by size; among equal sizes the lexicographically smaller prefix
/// ranks higher. Prefixes are unique within a map, so the order is strict.
#[derive(Debug, Clone)]
pub struct PrefixStat {
    pub prefix: String,
    pub size: u64,
    pub count: u64,
}

impl Ord for PrefixStat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size
            .cmp(&other.size)
            .then_with(|| other.prefix.cmp(&self.prefix))
    }
}

impl PartialOrd for PrefixStat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PrefixStat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrefixStat {}

/// Unbounded per-prefix accumulator for the duration of one scan
#[derive(Debug, Clone)]
pub struct PrefixAccumulator {
    separator: String,
    stats: AHashMap<String, PrefixStat>,
}

impl PrefixAccumulator {
    pub fn new(separator: impl Into<String>) -> Self {
        PrefixAccumulator {
            separator: separator.into(),
            stats: AHashMap::with_capacity(1024),
        }
    }

    #[inline]
    pub fn record(&mut self, key: &str, size: u64) {
        let prefix = derive_prefix(key, &self.separator);
        if let Some(stat) = self.stats.get_mut(prefix) {
            stat.size = stat.size.saturating_add(size);
            stat.count = stat.count.saturating_add(1);
            return;
        }
        self.stats.insert(
            prefix.to_string(),
            PrefixStat {
                prefix: prefix.to_string(),
                size,
                count: 1,
            },
        );
    }

    pub fn get(&self, prefix: &str) -> Option<&PrefixStat> {
        self.stats.get(prefix)
    }

    /// Number of distinct prefixes seen
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Keep the `top_n` largest prefixes, largest first
    pub fn reduce(self, top_n: usize) -> Vec<PrefixStat> {
        let mut ranking = BoundedRanking::new(top_n);
        for stat in self.stats.into_values() {
            ranking.insert(stat);
        }
        ranking.into_sorted_vec()
    }
}
