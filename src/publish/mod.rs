//! Result publishing
//!
//! - `payload`: JSON shapes of the status record and sorted-set members
//! - `keys`: result key naming
//! - `publisher`: the validate → scan → publish run
//! - `report`: optional local CSV export

mod keys;
mod payload;
mod publisher;
mod report;

pub use keys::ReportKey;
pub use payload::{
    format_size, BigKeyPayload, PrefixPayload, ScanStatus, STATUS_FAILED, STATUS_IN_PROGRESS,
    STATUS_OK,
};
pub use publisher::{Publisher, MSG_PUBLISHING, MSG_SCANNING, REPORT_TTL_SECS};
pub use report::{write_big_keys_csv, CSV_HEADER};
