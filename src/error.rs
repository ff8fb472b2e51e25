//! Top-level error type for a full analysis run

use crate::config::ConfigError;
use crate::publish::ScanStatus;
use crate::snapshot::SourceError;
use crate::store::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum AnalyzerError {
    Config(ConfigError),
    Source(SourceError),
    Store(StoreError),
    Encode(serde_json::Error),
    /// The blocking scan worker panicked or was cancelled
    Worker(String),
    Report(std::io::Error),
}

impl AnalyzerError {
    /// Failure status to publish for this error
    pub fn status(&self, time_sec: i64) -> ScanStatus {
        ScanStatus::failure(self.to_string(), time_sec)
    }
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerError::Config(e) => write!(f, "{}", e),
            AnalyzerError::Source(e) => write!(f, "{}", e),
            AnalyzerError::Store(e) => write!(f, "{}", e),
            AnalyzerError::Encode(e) => write!(f, "encode payload failed: {}", e),
            AnalyzerError::Worker(msg) => write!(f, "scan worker failed: {}", msg),
            AnalyzerError::Report(e) => write!(f, "write csv report failed: {}", e),
        }
    }
}

impl std::error::Error for AnalyzerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalyzerError::Config(e) => Some(e),
            AnalyzerError::Source(e) => Some(e),
            AnalyzerError::Store(e) => Some(e),
            AnalyzerError::Encode(e) => Some(e),
            AnalyzerError::Worker(_) => None,
            AnalyzerError::Report(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AnalyzerError {
    fn from(e: ConfigError) -> Self {
        AnalyzerError::Config(e)
    }
}

impl From<SourceError> for AnalyzerError {
    fn from(e: SourceError) -> Self {
        AnalyzerError::Source(e)
    }
}

impl From<StoreError> for AnalyzerError {
    fn from(e: StoreError) -> Self {
        AnalyzerError::Store(e)
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(e: serde_json::Error) -> Self {
        AnalyzerError::Encode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_carries_message() {
        let err = AnalyzerError::from(ConfigError::SeparatorCount(2));
        let status = err.status(42);
        assert_eq!(status.code, -1);
        assert_eq!(status.msg, "only support one separators");
        assert_eq!(status.time_sec, 42);
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err = AnalyzerError::from(StoreError::PoolClosed);
        assert_eq!(err.to_string(), "use of closed redis pool");
        assert!(err.source().is_some());
    }
}
