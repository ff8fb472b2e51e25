//! JSON payloads written to the backend

use crate::analysis::{BigKeyEntry, PrefixStat};
use serde::{Deserialize, Serialize};

/// Scan still running
pub const STATUS_IN_PROGRESS: i32 = 1;
pub const STATUS_OK: i32 = 0;
pub const STATUS_FAILED: i32 = -1;

/// Progress record polled by dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub code: i32,
    pub msg: String,
    /// Unix seconds when the status was produced
    pub time_sec: i64,
}

impl ScanStatus {
    pub fn in_progress(msg: impl Into<String>, time_sec: i64) -> Self {
        ScanStatus {
            code: STATUS_IN_PROGRESS,
            msg: msg.into(),
            time_sec,
        }
    }

    pub fn success(time_sec: i64) -> Self {
        ScanStatus {
            code: STATUS_OK,
            msg: "ok".to_string(),
            time_sec,
        }
    }

    pub fn failure(msg: impl Into<String>, time_sec: i64) -> Self {
        ScanStatus {
            code: STATUS_FAILED,
            msg: msg.into(),
            time_sec,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.code != STATUS_IN_PROGRESS
    }
}

/// One member of the big-key sorted set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigKeyPayload {
    pub db_index: u32,
    pub key: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub size: u64,
    pub readable_size: String,
    pub element_count: u64,
}

impl From<&BigKeyEntry> for BigKeyPayload {
    fn from(entry: &BigKeyEntry) -> Self {
        BigKeyPayload {
            db_index: entry.db,
            key: entry.key.clone(),
            object_type: entry.object_type.as_str().to_string(),
            size: entry.size,
            readable_size: format_size(entry.size),
            element_count: entry.element_count,
        }
    }
}

/// One member of the prefix sorted set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixPayload {
    pub prefix: String,
    pub size: u64,
    pub readable_size: String,
    pub count: u64,
}

impl From<&PrefixStat> for PrefixPayload {
    fn from(stat: &PrefixStat) -> Self {
        PrefixPayload {
            prefix: stat.prefix.clone(),
            size: stat.size,
            readable_size: format_size(stat.size),
            count: stat.count,
        }
    }
}

const UNITS: [(u64, &str); 7] = [
    (1 << 60, "E"),
    (1 << 50, "P"),
    (1 << 40, "T"),
    (1 << 30, "G"),
    (1 << 20, "M"),
    (1 << 10, "K"),
    (1, "B"),
];

/// Human-readable byte size: one decimal, trailing `.0` dropped.
///
/// `0` → `"0"`, `100` → `"100B"`, `1536` → `"1.5K"`, `1048576` → `"1M"`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0".to_string();
    }
    let (scale, unit) = UNITS
        .iter()
        .copied()
        .find(|(scale, _)| bytes >= *scale)
        .unwrap_or((1, "B"));

    let value = format!("{:.1}", bytes as f64 / scale as f64);
    let value = value.strip_suffix(".0").unwrap_or(&value);
    format!("{}{}", value, unit)
}
