//! Single-pass streaming classifier
//!
//! Each record is classified exactly once, in delivery order, into every
//! aggregate: TTL histogram, type histogram, big-key ranking and prefix map.
//! Aggregates are owned by one `ScanAggregates` per scan and are never
//! shared between scans.

use super::expiration::{ExpirationHistogram, TtlBucket};
use super::prefix::{PrefixAccumulator, PrefixStat};
use super::ranking::BoundedRanking;
use super::types::TypeHistogram;
use crate::clock::Clock;
use crate::snapshot::{ObjectType, SnapshotRecord};
use std::cmp::Ordering;

/// A candidate for the big-key list
///
/// Ranks by size; among equal sizes the record seen first ranks higher.
/// `seq` is assigned by the classifier and unique within a scan.
#[derive(Debug, Clone)]
pub struct BigKeyEntry {
    pub seq: u64,
    pub db: u32,
    pub key: String,
    pub object_type: ObjectType,
    pub size: u64,
    pub element_count: u64,
}

impl BigKeyEntry {
    fn from_record(seq: u64, record: SnapshotRecord) -> Self {
        BigKeyEntry {
            seq,
            db: record.db,
            key: record.key,
            object_type: record.object_type,
            size: record.size,
            element_count: record.element_count,
        }
    }
}

impl Ord for BigKeyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size
            .cmp(&other.size)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for BigKeyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for BigKeyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BigKeyEntry {}

/// Finished aggregates of one scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Records classified
    pub records: u64,
    pub expiration: ExpirationHistogram,
    pub types: TypeHistogram,
    /// Largest keys, largest first
    pub big_keys: Vec<BigKeyEntry>,
    /// Largest prefixes, largest first
    pub prefixes: Vec<PrefixStat>,
    /// Distinct prefixes seen before reduction
    pub distinct_prefixes: usize,
}

/// Mutable aggregate bundle for a scan in progress
pub struct ScanAggregates<C: Clock> {
    clock: C,
    top_n: usize,
    records: u64,
    expiration: ExpirationHistogram,
    types: TypeHistogram,
    big_keys: BoundedRanking<BigKeyEntry>,
    prefixes: PrefixAccumulator,
}

impl<C: Clock> ScanAggregates<C> {
    /// Verify all invariants hold for these aggregates
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        self.big_keys.verify_invariants();

        debug_assert_eq!(
            self.expiration.total_count(),
            self.records,
            "Invariant violated: TTL buckets must account for every record"
        );

        let typed: u64 = self.types.iter().map(|(_, s)| s.count).sum();
        debug_assert_eq!(
            typed, self.records,
            "Invariant violated: type histogram must account for every record"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    pub fn new(top_n: usize, separator: &str, clock: C) -> Self {
        ScanAggregates {
            clock,
            top_n,
            records: 0,
            expiration: ExpirationHistogram::new(),
            types: TypeHistogram::new(),
            big_keys: BoundedRanking::new(top_n),
            prefixes: PrefixAccumulator::new(separator),
        }
    }

    /// Fold one record into every aggregate
    pub fn classify(&mut self, record: SnapshotRecord) {
        let bucket = TtlBucket::classify(record.expire_at_ms, self.clock.now_ms());
        self.expiration.record(bucket, record.size);
        self.types.record(record.object_type, record.size);
        self.prefixes.record(&record.key, record.size);

        let seq = self.records;
        self.records += 1;
        self.big_keys.insert(BigKeyEntry::from_record(seq, record));
    }

    pub fn records_seen(&self) -> u64 {
        self.records
    }

    pub fn expiration(&self) -> &ExpirationHistogram {
        &self.expiration
    }

    pub fn types(&self) -> &TypeHistogram {
        &self.types
    }

    pub fn big_keys(&self) -> &BoundedRanking<BigKeyEntry> {
        &self.big_keys
    }

    /// Close the scan and reduce the prefix map
    pub fn finish(self) -> ScanReport {
        self.verify_invariants();
        let distinct_prefixes = self.prefixes.len();
        ScanReport {
            records: self.records,
            expiration: self.expiration,
            types: self.types,
            big_keys: self.big_keys.into_sorted_vec(),
            prefixes: self.prefixes.reduce(self.top_n),
            distinct_prefixes,
        }
    }
}
