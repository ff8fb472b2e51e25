//! Analyzer configuration
//!
//! Loaded from a TOML file or from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | RDB_DUMP_PATH | (required) | JSON-lines dump to analyze |
//! | RDB_TOP_N | 100 | Size of the big-key and prefix lists |
//! | RDB_SEPARATOR | `:` | Key namespace separator |
//! | RDB_BACKEND_ADDR | (required) | Redis instance that receives the results |
//! | RDB_BACKEND_PASSWORD | | AUTH password for the backend |
//! | RDB_REPORT_NAME | backend address | Suffix of every result key |
//! | RDB_KEY_FILTER | | Regex; only matching keys are analyzed |
//! | RDB_IO_TIMEOUT_MS | 100 | Connect, read and write timeout |
//! | RDB_IDLE_TIMEOUT_SECS | 60 | Pooled connection idle timeout (0 = never) |
//! | RDB_CSV_OUTPUT | | Also write the big-key list to this CSV file |

use crate::snapshot::{KeyFilter, SourceError};
use crate::store::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TOP_N: usize = 100;
pub const MAX_TOP_N: i64 = 10_000;

#[derive(Debug)]
pub enum ConfigError {
    MissingDumpPath,
    MissingBackendAddr,
    /// Number of separators supplied, when not exactly one
    SeparatorCount(usize),
    EmptySeparator,
    InvalidFilter(String),
    Invalid { field: &'static str, reason: String },
    Read { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingDumpPath => write!(f, "rdb file path is empty"),
            ConfigError::MissingBackendAddr => write!(f, "backend address is empty"),
            ConfigError::SeparatorCount(_) => write!(f, "only support one separators"),
            ConfigError::EmptySeparator => write!(f, "separator is empty"),
            ConfigError::InvalidFilter(msg) => write!(f, "invalid key filter: {}", msg),
            ConfigError::Invalid { field, reason } => write!(f, "invalid {}: {}", field, reason),
            ConfigError::Read { path, source } => {
                write!(f, "read config {} failed: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "parse config failed: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Raw, unvalidated analyzer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub dump_path: Option<PathBuf>,
    /// Out-of-range values fall back to 100
    pub top_n: i64,
    pub separators: Vec<String>,
    pub backend_addr: String,
    pub backend_password: Option<String>,
    /// Suffix of the result keys; defaults to the backend address
    pub report_name: Option<String>,
    pub key_filter: Option<String>,
    #[serde(rename = "io_timeout_ms", with = "duration_millis")]
    pub io_timeout: Duration,
    #[serde(rename = "idle_timeout_secs", with = "duration_secs")]
    pub idle_timeout: Duration,
    pub csv_output: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            dump_path: None,
            top_n: DEFAULT_TOP_N as i64,
            separators: vec![":".to_string()],
            backend_addr: String::new(),
            backend_password: None,
            report_name: None,
            key_filter: None,
            io_timeout: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(60),
            csv_output: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AnalyzerConfig::default();

        if let Some(path) = lookup("RDB_DUMP_PATH") {
            config.dump_path = Some(PathBuf::from(path));
        }
        if let Some(top_n) = lookup("RDB_TOP_N") {
            config.top_n = parse_number("RDB_TOP_N", &top_n)?;
        }
        if let Some(separator) = lookup("RDB_SEPARATOR") {
            config.separators = vec![separator];
        }
        if let Some(addr) = lookup("RDB_BACKEND_ADDR") {
            config.backend_addr = addr;
        }
        config.backend_password = lookup("RDB_BACKEND_PASSWORD").filter(|p| !p.is_empty());
        config.report_name = lookup("RDB_REPORT_NAME").filter(|n| !n.is_empty());
        config.key_filter = lookup("RDB_KEY_FILTER").filter(|p| !p.is_empty());
        if let Some(ms) = lookup("RDB_IO_TIMEOUT_MS") {
            config.io_timeout = Duration::from_millis(parse_number("RDB_IO_TIMEOUT_MS", &ms)?);
        }
        if let Some(secs) = lookup("RDB_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(parse_number("RDB_IDLE_TIMEOUT_SECS", &secs)?);
        }
        config.csv_output = lookup("RDB_CSV_OUTPUT")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every field.
    ///
    /// The backend address is checked first: without it there is nowhere
    /// to report any other problem.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let backend_addr = self.backend_addr.trim();
        if backend_addr.is_empty() {
            return Err(ConfigError::MissingBackendAddr);
        }

        let dump_path = match &self.dump_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => return Err(ConfigError::MissingDumpPath),
        };

        if self.separators.len() != 1 {
            return Err(ConfigError::SeparatorCount(self.separators.len()));
        }
        let separator = self.separators[0].clone();
        if separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }

        let key_filter = match &self.key_filter {
            Some(pattern) => Some(
                KeyFilter::new(pattern).map_err(|e| match e {
                    SourceError::Filter(msg) => ConfigError::InvalidFilter(msg),
                    other => ConfigError::InvalidFilter(other.to_string()),
                })?,
            ),
            None => None,
        };

        if self.io_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "io_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        let report_name = self
            .report_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(backend_addr)
            .to_string();

        Ok(ValidatedConfig {
            dump_path,
            top_n: effective_top_n(self.top_n),
            separator,
            backend_addr: backend_addr.to_string(),
            backend_password: self.backend_password.clone(),
            report_name,
            key_filter,
            io_timeout: self.io_timeout,
            idle_timeout: self.idle_timeout,
            csv_output: self.csv_output.clone(),
        })
    }
}

/// Clamp a requested list size: non-positive or above 10 000 means 100
pub fn effective_top_n(requested: i64) -> usize {
    if requested <= 0 || requested > MAX_TOP_N {
        DEFAULT_TOP_N
    } else {
        requested as usize
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("'{}': {}", value, e),
    })
}

/// Settings that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub dump_path: PathBuf,
    pub top_n: usize,
    pub separator: String,
    pub backend_addr: String,
    pub backend_password: Option<String>,
    pub report_name: String,
    pub key_filter: Option<KeyFilter>,
    pub io_timeout: Duration,
    pub idle_timeout: Duration,
    pub csv_output: Option<PathBuf>,
}

impl ValidatedConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            password: self.backend_password.clone(),
            io_timeout: self.io_timeout,
            idle_timeout: self.idle_timeout,
            ..PoolConfig::default()
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
