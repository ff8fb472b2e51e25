//! Backend store access
//!
//! - `resp`: RESP2 codec
//! - `client`: one connection with timeout-bounded I/O and a health flag
//! - `pool`: keyed idle-client pool with a periodic sweeper
//! - `info_cache`: per-address INFO cache
//! - `tokenizer`: whitespace command-line splitter for ad hoc relay
//! - `mock`: in-process backend used by tests

mod client;
mod info_cache;
pub mod mock;
mod pool;
mod resp;
mod tokenizer;

pub use client::StoreClient;
pub use info_cache::{InfoCache, InfoMap};
pub use pool::{PoolConfig, StorePool};
pub use resp::{RespError, RespParser, RespValue};
pub use tokenizer::{tokenize, TokenizeError};

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Connect {
        addr: String,
        source: std::io::Error,
    },
    Io(std::io::Error),
    /// Operation exceeded the I/O timeout
    Timeout(String),
    Protocol(RespError),
    /// Error reply from the server
    Server(String),
    UnexpectedReply(String),
    /// Peer closed the connection
    ConnectionClosed(String),
    /// Client was flagged unhealthy by an earlier failure
    Unhealthy(String),
    PoolClosed,
    Tokenize(TokenizeError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connect { addr, source } => write!(f, "connect to {} failed: {}", addr, source),
            StoreError::Io(e) => write!(f, "i/o error: {}", e),
            StoreError::Timeout(op) => write!(f, "{} timed out", op),
            StoreError::Protocol(e) => write!(f, "{}", e),
            StoreError::Server(msg) => write!(f, "server error: {}", msg),
            StoreError::UnexpectedReply(reply) => write!(f, "unexpected reply: {}", reply),
            StoreError::ConnectionClosed(addr) => write!(f, "connection to {} closed by peer", addr),
            StoreError::Unhealthy(addr) => write!(f, "connection to {} is unhealthy", addr),
            StoreError::PoolClosed => write!(f, "use of closed redis pool"),
            StoreError::Tokenize(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Connect { source, .. } => Some(source),
            StoreError::Io(e) => Some(e),
            StoreError::Protocol(e) => Some(e),
            StoreError::Tokenize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<RespError> for StoreError {
    fn from(e: RespError) -> Self {
        StoreError::Protocol(e)
    }
}

impl From<TokenizeError> for StoreError {
    fn from(e: TokenizeError) -> Self {
        StoreError::Tokenize(e)
    }
}
