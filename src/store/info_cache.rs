//! Per-address cache of `INFO` output
//!
//! The first lookup for an address dials a dedicated connection, fetches
//! INFO and closes it. A failed fetch caches an empty map, so an
//! unreachable instance is not retried on every lookup.

use super::client::StoreClient;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub type InfoMap = HashMap<String, String>;

pub struct InfoCache {
    password: Option<String>,
    io_timeout: Duration,
    entries: Mutex<HashMap<String, Arc<InfoMap>>>,
}

impl InfoCache {
    pub fn new(password: Option<String>, io_timeout: Duration) -> Self {
        InfoCache {
            password,
            io_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached INFO for `addr`, fetched on first use
    pub async fn get(&self, addr: &str) -> Arc<InfoMap> {
        if let Some(info) = self.entries.lock().get(addr) {
            return info.clone();
        }

        let fetched = match self.fetch(addr).await {
            Ok(info) => info,
            Err(e) => {
                warn!(addr, error = %e, "INFO fetch failed");
                InfoMap::new()
            }
        };

        // A concurrent lookup may have won the race; keep the first non-empty result
        let mut entries = self.entries.lock();
        let slot = entries
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(InfoMap::new()));
        if slot.is_empty() && !fetched.is_empty() {
            *slot = Arc::new(fetched);
        }
        slot.clone()
    }

    /// `run_id` of the instance at `addr`, empty if unknown
    pub async fn run_id(&self, addr: &str) -> String {
        self.get(addr)
            .await
            .get("run_id")
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the cached entry so the next lookup refetches
    pub fn invalidate(&self, addr: &str) {
        self.entries.lock().remove(addr);
    }

    async fn fetch(&self, addr: &str) -> Result<InfoMap, super::StoreError> {
        let mut client = StoreClient::connect(addr, self.password.as_deref(), self.io_timeout).await?;
        client.info().await
    }
}
