//! Offline analysis of Redis snapshot dumps
//!
//! A dump is streamed once, record by record, into a set of aggregates: the
//! largest keys, a TTL histogram, per-type counts and sizes, and cumulative
//! sizes per key prefix. The finished aggregates are written as JSON to a
//! Redis backend for dashboards to read.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod publish;
pub mod snapshot;
pub mod store;

pub use analysis::{scan, BoundedRanking, ScanAggregates, ScanReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AnalyzerConfig, ConfigError, ValidatedConfig};
pub use error::AnalyzerError;
pub use publish::Publisher;
pub use snapshot::{JsonLinesSource, KeyFilter, ObjectType, RecordSource, SnapshotRecord, SourceError};
pub use store::{PoolConfig, StoreClient, StoreError, StorePool};
