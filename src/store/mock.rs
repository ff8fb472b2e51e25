//! In-process RESP backend for tests
//!
//! Speaks enough of the protocol for the publisher and pool: AUTH, PING,
//! SET (with EX), GET, DEL, ZADD, EXPIRE, SELECT, CONFIG and INFO. Every command is
//! recorded in arrival order so tests can assert on the exact write
//! sequence. Failures can be injected per command name.

use super::resp::{RespParser, RespValue};
use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

const SETTLE_ROUNDS: usize = 50;
const SETTLE_INTERVAL: Duration = Duration::from_millis(2);

/// Reported as `run_id` in INFO
pub const MOCK_RUN_ID: &str = "6c1f0e4b0c1c5e0f9a4d2b7e3f8a1c9d0e2b4a6f";

#[derive(Default)]
struct MockState {
    strings: HashMap<String, String>,
    zsets: HashMap<String, Vec<(i64, String)>>,
    ttls: HashMap<String, u64>,
    commands: Vec<Vec<String>>,
    failing: HashSet<String>,
    hang_up: HashSet<String>,
    config: HashMap<String, String>,
}

impl MockState {
    fn exists(&self, key: &str) -> bool {
        self.strings.contains_key(key) || self.zsets.contains_key(key)
    }
}

struct Shared {
    state: Mutex<MockState>,
    connections: AtomicUsize,
    password: Option<String>,
}

enum Reply {
    Value(RespValue),
    HangUp,
}

pub struct MockBackend {
    addr: String,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl MockBackend {
    /// Listen on an ephemeral localhost port
    pub async fn start() -> std::io::Result<Self> {
        Self::spawn(None).await
    }

    /// Like `start`, but every connection must AUTH first
    pub async fn start_with_password(password: &str) -> std::io::Result<Self> {
        Self::spawn(Some(password.to_string())).await
    }

    async fn spawn(password: Option<String>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState::default()),
            connections: AtomicUsize::new(0),
            password,
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                debug!(%peer, "mock backend accepted connection");
                let conn_shared = accept_shared.clone();
                tokio::spawn(serve(stream, conn_shared));
            }
        });

        Ok(MockBackend {
            addr,
            shared,
            accept_task,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connections accepted so far.
    ///
    /// A dial completes once the kernel finishes the handshake, before the
    /// accept task has run. Waits until the count stops moving so callers
    /// see every connection already dialed.
    pub async fn connection_count(&self) -> usize {
        let mut last = self.shared.connections.load(Ordering::SeqCst);
        for _ in 0..SETTLE_ROUNDS {
            tokio::time::sleep(SETTLE_INTERVAL).await;
            tokio::task::yield_now().await;
            let now = self.shared.connections.load(Ordering::SeqCst);
            if now == last {
                return now;
            }
            last = now;
        }
        last
    }

    /// Every command received, in arrival order
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.shared.state.lock().commands.clone()
    }

    /// Names of the commands received, in arrival order
    pub fn command_names(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .commands
            .iter()
            .filter_map(|c| c.first().cloned())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.shared.state.lock().strings.get(key).cloned()
    }

    /// Sorted-set members ordered by ascending score
    pub fn zset(&self, key: &str) -> Vec<(i64, String)> {
        self.shared
            .state
            .lock()
            .zsets
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.shared.state.lock().ttls.get(key).copied()
    }

    /// Value applied through CONFIG SET
    pub fn config_value(&self, name: &str) -> Option<String> {
        self.shared.state.lock().config.get(name).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shared.state.lock().exists(key)
    }

    /// Answer every future `name` command with an error reply
    pub fn fail_command(&self, name: &str) {
        self.shared
            .state
            .lock()
            .failing
            .insert(name.to_ascii_uppercase());
    }

    /// Drop the connection instead of answering `name`
    pub fn hang_up_on(&self, name: &str) {
        self.shared
            .state
            .lock()
            .hang_up
            .insert(name.to_ascii_uppercase());
    }

    pub fn clear_failures(&self) {
        let mut state = self.shared.state.lock();
        state.failing.clear();
        state.hang_up.clear();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(mut stream: TcpStream, shared: Arc<Shared>) {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut authenticated = shared.password.is_none();
    let mut read_buf = [0u8; 4096];

    loop {
        let n = match stream.read(&mut read_buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&read_buf[..n]);

        loop {
            let (value, consumed) = match RespParser::parse(&buffer) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(_) => return,
            };
            buffer.advance(consumed);

            let args = match command_args(&value) {
                Some(args) if !args.is_empty() => args,
                _ => {
                    let err = RespValue::Error("ERR invalid request".to_string());
                    if stream.write_all(&RespParser::encode(&err)).await.is_err() {
                        return;
                    }
                    continue;
                }
            };

            let reply = match execute(&shared, &mut authenticated, args) {
                Reply::Value(v) => v,
                Reply::HangUp => return,
            };
            if stream.write_all(&RespParser::encode(&reply)).await.is_err() {
                return;
            }
        }
    }
}

fn command_args(value: &RespValue) -> Option<Vec<String>> {
    match value {
        RespValue::Array(Some(items)) => items.iter().map(RespValue::as_text).collect(),
        _ => None,
    }
}

fn ok() -> Reply {
    Reply::Value(RespValue::SimpleString("OK".to_string()))
}

fn error(msg: &str) -> Reply {
    Reply::Value(RespValue::Error(msg.to_string()))
}

fn wrong_args(name: &str) -> Reply {
    error(&format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn execute(shared: &Shared, authenticated: &mut bool, mut args: Vec<String>) -> Reply {
    let name = args[0].to_ascii_uppercase();
    args[0] = name.clone();

    let mut state = shared.state.lock();
    state.commands.push(args.clone());

    if state.hang_up.contains(&name) {
        return Reply::HangUp;
    }
    if state.failing.contains(&name) {
        return error("ERR injected failure");
    }

    if name == "AUTH" {
        return match (&shared.password, args.get(1)) {
            (None, _) => error("ERR AUTH <password> called without any password configured"),
            (Some(_), None) => wrong_args(&name),
            (Some(expected), Some(given)) if expected == given => {
                *authenticated = true;
                ok()
            }
            (Some(_), Some(_)) => error("WRONGPASS invalid username-password pair"),
        };
    }
    if !*authenticated {
        return error("NOAUTH Authentication required.");
    }

    match name.as_str() {
        "PING" => Reply::Value(RespValue::SimpleString("PONG".to_string())),
        "SELECT" => {
            if args.len() != 2 {
                return wrong_args(&name);
            }
            match args[1].parse::<u32>() {
                Ok(_) => ok(),
                Err(_) => error("ERR value is not an integer or out of range"),
            }
        }
        "SET" => {
            if args.len() != 3 && args.len() != 5 {
                return wrong_args(&name);
            }
            let ttl = if args.len() == 5 {
                if !args[3].eq_ignore_ascii_case("EX") {
                    return error("ERR syntax error");
                }
                match args[4].parse::<u64>() {
                    Ok(ttl) => Some(ttl),
                    Err(_) => return error("ERR value is not an integer or out of range"),
                }
            } else {
                None
            };
            let key = args[1].clone();
            state.zsets.remove(&key);
            state.strings.insert(key.clone(), args[2].clone());
            match ttl {
                Some(ttl) => state.ttls.insert(key, ttl),
                None => state.ttls.remove(&key),
            };
            ok()
        }
        "GET" => {
            if args.len() != 2 {
                return wrong_args(&name);
            }
            let value = state.strings.get(&args[1]).map(|v| v.clone().into_bytes());
            Reply::Value(RespValue::BulkString(value))
        }
        "DEL" => {
            if args.len() < 2 {
                return wrong_args(&name);
            }
            let mut removed = 0;
            for key in &args[1..] {
                let existed = state.strings.remove(key).is_some() | state.zsets.remove(key).is_some();
                state.ttls.remove(key);
                if existed {
                    removed += 1;
                }
            }
            Reply::Value(RespValue::Integer(removed))
        }
        "ZADD" => {
            if args.len() < 4 || args.len() % 2 != 0 {
                return wrong_args(&name);
            }
            let key = args[1].clone();
            if state.strings.contains_key(&key) {
                return error("WRONGTYPE Operation against a key holding the wrong kind of value");
            }
            let mut pairs = Vec::new();
            for chunk in args[2..].chunks(2) {
                match chunk[0].parse::<i64>() {
                    Ok(score) => pairs.push((score, chunk[1].clone())),
                    Err(_) => return error("ERR value is not a valid float"),
                }
            }
            let zset = state.zsets.entry(key).or_default();
            let mut added = 0;
            for (score, member) in pairs {
                match zset.iter_mut().find(|(_, m)| *m == member) {
                    Some(existing) => existing.0 = score,
                    None => {
                        zset.push((score, member));
                        added += 1;
                    }
                }
            }
            zset.sort();
            Reply::Value(RespValue::Integer(added))
        }
        "EXPIRE" => {
            if args.len() != 3 {
                return wrong_args(&name);
            }
            let ttl = match args[2].parse::<u64>() {
                Ok(ttl) => ttl,
                Err(_) => return error("ERR value is not an integer or out of range"),
            };
            if state.exists(&args[1]) {
                state.ttls.insert(args[1].clone(), ttl);
                Reply::Value(RespValue::Integer(1))
            } else {
                Reply::Value(RespValue::Integer(0))
            }
        }
        "INFO" => {
            let text = format!(
                "# Server\r\nredis_version:7.2.0\r\nredis_mode:standalone\r\nrun_id:{}\r\n\r\n# Clients\r\nconnected_clients:{}\r\n\r\n# Keyspace\r\nkeys:{}\r\n",
                MOCK_RUN_ID,
                shared.connections.load(Ordering::SeqCst),
                state.strings.len() + state.zsets.len()
            );
            Reply::Value(RespValue::BulkString(Some(text.into_bytes())))
        }
        "CONFIG" => match args.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("SET") if args.len() == 4 => {
                state.config.insert(args[2].clone(), args[3].clone());
                ok()
            }
            Some("GET") if args.len() == 3 => {
                let mut items = Vec::new();
                if let Some(value) = state.config.get(&args[2]) {
                    items.push(RespValue::BulkString(Some(args[2].clone().into_bytes())));
                    items.push(RespValue::BulkString(Some(value.clone().into_bytes())));
                }
                Reply::Value(RespValue::Array(Some(items)))
            }
            Some("REWRITE") if args.len() == 2 => ok(),
            _ => error("ERR unknown CONFIG subcommand or wrong number of arguments"),
        },
        _ => error(&format!("ERR unknown command '{}'", args[0])),
    }
}
