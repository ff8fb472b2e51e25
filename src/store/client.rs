//! Single backend connection
//!
//! Every network operation is bounded by the client's I/O timeout. Any I/O
//! or protocol failure clears the health flag so the pool discards the
//! connection instead of recycling it. An error *reply* from the server
//! leaves the connection usable.

use super::resp::{RespParser, RespValue};
use super::tokenizer::tokenize;
use super::StoreError;
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

pub struct StoreClient {
    stream: TcpStream,
    addr: String,
    buffer: BytesMut,
    io_timeout: Duration,
    last_used: Instant,
    healthy: bool,
    database: u32,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("addr", &self.addr)
            .field("healthy", &self.healthy)
            .field("database", &self.database)
            .finish()
    }
}

impl StoreClient {
    /// Dial `addr` and authenticate if a password is given
    pub async fn connect(
        addr: &str,
        password: Option<&str>,
        io_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let stream = match timeout(io_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(StoreError::Connect {
                    addr: addr.to_string(),
                    source: e,
                })
            }
            Err(_) => return Err(StoreError::Timeout(format!("connect to {}", addr))),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr, error = %e, "set TCP_NODELAY failed");
        }

        let mut client = StoreClient {
            stream,
            addr: addr.to_string(),
            buffer: BytesMut::with_capacity(4096),
            io_timeout,
            last_used: Instant::now(),
            healthy: true,
            database: 0,
        };

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            client.execute(&["AUTH", password]).await?;
        }
        debug!(addr, "backend connection established");
        Ok(client)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Flag the connection as unusable; the pool will close it on check-in
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Send one command and wait for its reply.
    ///
    /// Error replies become `StoreError::Server`.
    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue, StoreError> {
        if !self.healthy {
            return Err(StoreError::Unhealthy(self.addr.clone()));
        }

        let request = RespParser::encode_command(args);
        let reply = match self.round_trip(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "backend connection failed");
                self.healthy = false;
                return Err(e);
            }
        };
        self.last_used = Instant::now();

        match reply {
            RespValue::Error(msg) => Err(StoreError::Server(msg)),
            other => Ok(other),
        }
    }

    async fn round_trip(&mut self, request: &[u8]) -> Result<RespValue, StoreError> {
        let io_timeout = self.io_timeout;
        with_timeout(io_timeout, "write", self.stream.write_all(request)).await?;

        loop {
            if let Some((value, consumed)) = RespParser::parse(&self.buffer)? {
                self.buffer.advance(consumed);
                return Ok(value);
            }

            let mut read_buf = [0u8; 4096];
            let n = with_timeout(io_timeout, "read", self.stream.read(&mut read_buf)).await?;
            if n == 0 {
                return Err(StoreError::ConnectionClosed(self.addr.clone()));
            }
            self.buffer.extend_from_slice(&read_buf[..n]);
        }
    }

    /// SET key value EX ttl
    pub async fn set_ex(&mut self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let ttl = ttl_secs.to_string();
        self.execute(&["SET", key, value, "EX", &ttl]).await?;
        Ok(())
    }

    pub async fn del(&mut self, key: &str) -> Result<i64, StoreError> {
        let reply = self.execute(&["DEL", key]).await?;
        Ok(reply.as_integer().unwrap_or(0))
    }

    pub async fn zadd(&mut self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let score = score.to_string();
        self.execute(&["ZADD", key, &score, member]).await?;
        Ok(())
    }

    pub async fn expire(&mut self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let ttl = ttl_secs.to_string();
        self.execute(&["EXPIRE", key, &ttl]).await?;
        Ok(())
    }

    /// Switch database, skipping the round trip if already selected
    pub async fn select(&mut self, database: u32) -> Result<(), StoreError> {
        if self.database == database {
            return Ok(());
        }
        let db = database.to_string();
        self.execute(&["SELECT", &db]).await?;
        self.database = database;
        Ok(())
    }

    /// INFO parsed into `field -> value`
    pub async fn info(&mut self) -> Result<HashMap<String, String>, StoreError> {
        let reply = self.execute(&["INFO"]).await?;
        let text = reply
            .as_text()
            .ok_or_else(|| StoreError::UnexpectedReply(format!("{:?}", reply)))?;
        Ok(parse_info(&text))
    }

    /// CONFIG SET followed by CONFIG REWRITE so the change survives a restart
    pub async fn config_set(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        self.execute(&["CONFIG", "SET", name, value]).await?;
        self.execute(&["CONFIG", "REWRITE"]).await?;
        Ok(())
    }

    /// Relay a whitespace-separated command line verbatim
    pub async fn execute_line(&mut self, line: &str) -> Result<RespValue, StoreError> {
        let (cmd, args) = tokenize(line)?;
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(cmd);
        parts.extend(args);
        self.execute(&parts).await
    }
}

async fn with_timeout<T, F>(limit: Duration, op: &str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(StoreError::Io),
        Err(_) => Err(StoreError::Timeout(op.to_string())),
    }
}

/// Parse `INFO` output; comment and blank lines are skipped
pub(crate) fn parse_info(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() || key.starts_with('#') {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
