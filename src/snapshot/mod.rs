//! Snapshot record sources
//!
//! Decoding the binary RDB format is delegated to an external converter;
//! this module consumes its JSON-lines output (or any in-memory iterator)
//! and delivers records one at a time, in dump order.

mod filter;
mod record;
mod source;

pub use filter::KeyFilter;
pub use record::{ObjectType, SnapshotRecord};
pub use source::{FilteredSource, IterSource, JsonLinesSource, RecordSource, ScanOutcome};

use std::path::PathBuf;

/// Errors raised while reading a dump
#[derive(Debug)]
pub enum SourceError {
    /// The dump file could not be opened
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// I/O failure mid-scan
    Io(std::io::Error),
    /// A record could not be decoded
    Decode { line: u64, message: String },
    /// Invalid key filter pattern
    Filter(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open { path, source } => {
                write!(f, "open rdb {} failed, {}", path.display(), source)
            }
            SourceError::Io(e) => write!(f, "read dump failed: {}", e),
            SourceError::Decode { line, message } => {
                write!(f, "decode record at line {} failed: {}", line, message)
            }
            SourceError::Filter(msg) => write!(f, "invalid key filter: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Open { source, .. } => Some(source),
            SourceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}
