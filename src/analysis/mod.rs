//! Streaming aggregation over snapshot records
//!
//! - `ranking`: capacity-bounded top-K selector
//! - `expiration`: nine-bucket TTL histogram
//! - `types`: per-type count and size
//! - `prefix`: unbounded prefix map plus its bounded reduction
//! - `classifier`: drives each record into all of the above

mod classifier;
mod expiration;
mod prefix;
mod ranking;
mod types;

pub use classifier::{BigKeyEntry, ScanAggregates, ScanReport};
pub use expiration::{ExpirationHistogram, TtlBucket};
pub use prefix::{derive_prefix, PrefixAccumulator, PrefixStat, OTHERS_PREFIX};
pub use ranking::BoundedRanking;
pub use types::{TypeHistogram, TypeStat};

use crate::clock::Clock;
use crate::snapshot::{RecordSource, SourceError};
use std::ops::ControlFlow;
use tracing::{debug, info};

/// Records between progress log lines
const PROGRESS_EVERY: u64 = 100_000;

/// Run a full pass over `source`, classifying every record.
///
/// A decode error aborts the pass and the partial aggregates are dropped.
pub fn scan<S, C>(
    source: &mut S,
    top_n: usize,
    separator: &str,
    clock: C,
) -> Result<ScanReport, SourceError>
where
    S: RecordSource,
    C: Clock,
{
    let mut aggregates = ScanAggregates::new(top_n, separator, clock);

    let outcome = source.scan(|record| {
        aggregates.classify(record);
        let seen = aggregates.records_seen();
        if seen % PROGRESS_EVERY == 0 {
            debug!(records = seen, "scan progress");
        }
        ControlFlow::Continue(())
    })?;

    let report = aggregates.finish();
    info!(
        records = report.records,
        filtered = outcome.filtered,
        big_keys = report.big_keys.len(),
        distinct_prefixes = report.distinct_prefixes,
        "scan complete"
    );
    Ok(report)
}
