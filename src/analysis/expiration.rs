//! TTL histogram
//!
//! Every record falls into exactly one of nine buckets, decided once from
//! `expire_at - now` at the moment the record is classified. Window lower
//! bounds are inclusive: exactly one hour remaining lands in `OneToThreeHours`.

use std::collections::BTreeMap;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Remaining time-to-live category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TtlBucket {
    /// Key never expires
    NoExpiry,
    /// Expiration already passed
    Stale,
    UnderOneHour,
    OneToThreeHours,
    ThreeToTwelveHours,
    TwelveToTwentyFourHours,
    OneToTwoDays,
    TwoToSevenDays,
    BeyondSevenDays,
}

impl TtlBucket {
    pub const COUNT: usize = 9;

    pub const ALL: [TtlBucket; TtlBucket::COUNT] = [
        TtlBucket::NoExpiry,
        TtlBucket::Stale,
        TtlBucket::UnderOneHour,
        TtlBucket::OneToThreeHours,
        TtlBucket::ThreeToTwelveHours,
        TtlBucket::TwelveToTwentyFourHours,
        TtlBucket::OneToTwoDays,
        TtlBucket::TwoToSevenDays,
        TtlBucket::BeyondSevenDays,
    ];

    /// Classify an absolute expiration (Unix ms) against `now_ms`.
    ///
    /// The TTL is measured in whole seconds, both instants floored.
    pub fn classify(expire_at_ms: Option<i64>, now_ms: i64) -> Self {
        let expire_at_ms = match expire_at_ms {
            Some(ms) => ms,
            None => return TtlBucket::NoExpiry,
        };
        let ttl = expire_at_ms
            .div_euclid(1000)
            .saturating_sub(now_ms.div_euclid(1000));

        match ttl {
            t if t < 0 => TtlBucket::Stale,
            t if t < HOUR_SECS => TtlBucket::UnderOneHour,
            t if t < 3 * HOUR_SECS => TtlBucket::OneToThreeHours,
            t if t < 12 * HOUR_SECS => TtlBucket::ThreeToTwelveHours,
            t if t < DAY_SECS => TtlBucket::TwelveToTwentyFourHours,
            t if t < 2 * DAY_SECS => TtlBucket::OneToTwoDays,
            t if t < 7 * DAY_SECS => TtlBucket::TwoToSevenDays,
            _ => TtlBucket::BeyondSevenDays,
        }
    }

    /// Stable numeric code used as the key in published payloads
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        TtlBucket::ALL.get(code as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            TtlBucket::NoExpiry => "none",
            TtlBucket::Stale => "stale",
            TtlBucket::UnderOneHour => "<1h",
            TtlBucket::OneToThreeHours => "1h-3h",
            TtlBucket::ThreeToTwelveHours => "3h-12h",
            TtlBucket::TwelveToTwentyFourHours => "12h-24h",
            TtlBucket::OneToTwoDays => "1d-2d",
            TtlBucket::TwoToSevenDays => "2d-7d",
            TtlBucket::BeyondSevenDays => ">7d",
        }
    }
}

/// Record count and cumulative size per TTL bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirationHistogram {
    counts: [u64; TtlBucket::COUNT],
    sizes: [u64; TtlBucket::COUNT],
}

impl ExpirationHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, bucket: TtlBucket, size: u64) {
        let idx = bucket as usize;
        self.counts[idx] = self.counts[idx].saturating_add(1);
        self.sizes[idx] = self.sizes[idx].saturating_add(size);
    }

    pub fn count(&self, bucket: TtlBucket) -> u64 {
        self.counts[bucket as usize]
    }

    pub fn size(&self, bucket: TtlBucket) -> u64 {
        self.sizes[bucket as usize]
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Counts keyed by bucket code, all nine buckets present
    pub fn counts_by_code(&self) -> BTreeMap<u8, u64> {
        TtlBucket::ALL
            .iter()
            .map(|b| (b.code(), self.count(*b)))
            .collect()
    }

    /// Cumulative sizes keyed by bucket code, all nine buckets present
    pub fn sizes_by_code(&self) -> BTreeMap<u8, u64> {
        TtlBucket::ALL
            .iter()
            .map(|b| (b.code(), self.size(*b)))
            .collect()
    }
}
