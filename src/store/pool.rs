//! Keyed connection pool
//!
//! Idle clients are kept per address, most recently used at the front.
//! A client is recyclable when it is healthy and has been idle for less
//! than the idle timeout (a zero timeout never expires). Non-recyclable
//! clients are closed wherever the pool encounters them: on checkout,
//! on checkin, and in the periodic sweep.
//!
//! The state mutex is never held across an await point; dialing happens
//! outside the lock.

use super::client::StoreClient;
use super::StoreError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Sent as AUTH on every new connection
    pub password: Option<String>,
    /// Bound on connect, read and write
    pub io_timeout: Duration,
    /// Idle clients older than this are closed; zero disables expiry
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            password: None,
            io_timeout: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<String, VecDeque<StoreClient>>,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn is_recyclable(&self, client: &StoreClient) -> bool {
        client.is_healthy()
            && (self.config.idle_timeout.is_zero() || client.idle_for() < self.config.idle_timeout)
    }

    fn sweep(&self) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StoreError::PoolClosed);
        }

        let mut closed = 0;
        for clients in state.idle.values_mut() {
            let before = clients.len();
            clients.retain(|c| self.is_recyclable(c));
            closed += before - clients.len();
        }
        state.idle.retain(|_, clients| !clients.is_empty());
        Ok(closed)
    }
}

struct Maintenance {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Shared pool of backend connections
///
/// Dropping the pool stops the maintenance task; `close` additionally
/// closes every idle client and waits for the task to exit.
pub struct StorePool {
    inner: Arc<PoolInner>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl StorePool {
    /// Create a pool and start its maintenance task.
    ///
    /// Must be called from within a tokio runtime unless the idle timeout
    /// is zero, in which case no task is started.
    pub fn new(config: PoolConfig) -> Self {
        let sweeping = !config.idle_timeout.is_zero() && !config.sweep_interval.is_zero();
        let inner = Arc::new(PoolInner {
            config,
            state: Mutex::new(PoolState::default()),
        });

        let maintenance = sweeping.then(|| {
            let (shutdown, shutdown_rx) = oneshot::channel();
            let handle = tokio::spawn(maintain(inner.clone(), shutdown_rx));
            Maintenance { shutdown, handle }
        });

        StorePool {
            inner,
            maintenance: Mutex::new(maintenance),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Take a recyclable idle client for `addr`, or dial a new one
    pub async fn checkout(&self, addr: &str) -> Result<StoreClient, StoreError> {
        loop {
            let candidate = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(StoreError::PoolClosed);
                }
                state.idle.get_mut(addr).and_then(VecDeque::pop_front)
            };

            match candidate {
                Some(client) if self.inner.is_recyclable(&client) => return Ok(client),
                Some(client) => {
                    debug!(addr, healthy = client.is_healthy(), "closing stale idle client");
                }
                None => break,
            }
        }

        let config = &self.inner.config;
        StoreClient::connect(addr, config.password.as_deref(), config.io_timeout).await
    }

    /// Return a client; it is kept only if still recyclable
    pub fn checkin(&self, client: StoreClient) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(StoreError::PoolClosed);
        }
        if !self.inner.is_recyclable(&client) {
            debug!(addr = client.addr(), healthy = client.is_healthy(), "discarding client on checkin");
            return Ok(());
        }
        state
            .idle
            .entry(client.addr().to_string())
            .or_default()
            .push_front(client);
        Ok(())
    }

    /// Close every non-recyclable idle client; returns how many were closed
    pub fn sweep(&self) -> Result<usize, StoreError> {
        self.inner.sweep()
    }

    /// Close the pool. Safe to call more than once.
    pub async fn close(&self) {
        let drained: Vec<StoreClient> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.idle.drain().flat_map(|(_, clients)| clients).collect()
        };
        if !drained.is_empty() {
            info!(clients = drained.len(), "closing idle backend connections");
        }
        drop(drained);

        let maintenance = self.maintenance.lock().take();
        if let Some(Maintenance { shutdown, handle }) = maintenance {
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                warn!(error = %e, "pool maintenance task ended abnormally");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Idle clients currently held for `addr`
    pub fn idle_count(&self, addr: &str) -> usize {
        self.inner
            .state
            .lock()
            .idle
            .get(addr)
            .map_or(0, VecDeque::len)
    }

    /// Fetch and parse INFO from `addr` through a pooled client
    pub async fn info(&self, addr: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut client = self.checkout(addr).await?;
        let result = client.info().await;
        self.checkin(client)?;
        result
    }
}

async fn maintain(inner: Arc<PoolInner>, mut shutdown: oneshot::Receiver<()>) {
    let period = inner.config.sweep_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Also fires when the pool is dropped without close()
            _ = &mut shutdown => break,
            _ = ticker.tick() => match inner.sweep() {
                Ok(0) => {}
                Ok(closed) => debug!(closed, "idle sweep closed clients"),
                Err(_) => break,
            },
        }
    }
    debug!("pool maintenance task stopped");
}
