//! Per-type key histogram

use crate::snapshot::ObjectType;
use std::collections::BTreeMap;

/// Count and cumulative size for one object type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeStat {
    pub count: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHistogram {
    stats: BTreeMap<ObjectType, TypeStat>,
}

impl TypeHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, object_type: ObjectType, size: u64) {
        let stat = self.stats.entry(object_type).or_default();
        stat.count = stat.count.saturating_add(1);
        stat.size = stat.size.saturating_add(size);
    }

    pub fn get(&self, object_type: ObjectType) -> TypeStat {
        self.stats.get(&object_type).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectType, TypeStat)> + '_ {
        self.stats.iter().map(|(t, s)| (*t, *s))
    }

    /// Key counts by type name; only types that occurred are present
    pub fn counts_by_name(&self) -> BTreeMap<String, u64> {
        self.iter()
            .map(|(t, s)| (t.as_str().to_string(), s.count))
            .collect()
    }

    /// Cumulative sizes by type name; only types that occurred are present
    pub fn sizes_by_name(&self) -> BTreeMap<String, u64> {
        self.iter()
            .map(|(t, s)| (t.as_str().to_string(), s.size))
            .collect()
    }
}
