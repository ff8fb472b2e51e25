//! End-to-end run: validate, scan, publish
//!
//! Progress is reported through the status key so a dashboard polling the
//! backend can follow the run: code 1 while working, then 0 on success or
//! -1 with the error message. Every aggregate key expires after 30 days.

use super::keys::ReportKey;
use super::payload::{BigKeyPayload, PrefixPayload, ScanStatus};
use crate::analysis::{self, ScanReport};
use crate::clock::Clock;
use crate::config::{AnalyzerConfig, ConfigError, ValidatedConfig};
use crate::error::AnalyzerError;
use crate::snapshot::{FilteredSource, JsonLinesSource, RecordSource, SourceError};
use crate::store::{StoreClient, StorePool};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 30 days
pub const REPORT_TTL_SECS: u64 = 2_592_000;

pub const MSG_SCANNING: &str = "scan rdb file...";
pub const MSG_PUBLISHING: &str = "publish aggregates...";

pub struct Publisher<C: Clock> {
    pool: Arc<StorePool>,
    clock: C,
}

impl<C: Clock> Publisher<C> {
    pub fn new(pool: Arc<StorePool>, clock: C) -> Self {
        Publisher { pool, clock }
    }

    pub fn pool(&self) -> &Arc<StorePool> {
        &self.pool
    }

    /// Analyze the JSON-lines dump named by the configuration
    pub async fn run(&self, config: &AnalyzerConfig) -> Result<ScanReport, AnalyzerError> {
        self.run_with(config, |path| JsonLinesSource::open(path)).await
    }

    /// Analyze the dump produced by `open`.
    ///
    /// `open` runs on the blocking scan worker together with the scan.
    pub async fn run_with<S, F>(
        &self,
        config: &AnalyzerConfig,
        open: F,
    ) -> Result<ScanReport, AnalyzerError>
    where
        S: RecordSource,
        F: FnOnce(&Path) -> Result<S, SourceError> + Send + 'static,
    {
        let validated = match config.validate() {
            Ok(validated) => validated,
            Err(ConfigError::MissingBackendAddr) => {
                return Err(ConfigError::MissingBackendAddr.into());
            }
            Err(e) => {
                let err = AnalyzerError::from(e);
                let addr = config.backend_addr.trim();
                let name = config
                    .report_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(addr);
                error!(error = %err, "invalid configuration");
                self.publish_failure(addr, name, &err).await;
                return Err(err);
            }
        };

        match self.execute(&validated, open).await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(report = %validated.report_name, error = %err, "analysis failed");
                self.publish_failure(&validated.backend_addr, &validated.report_name, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn execute<S, F>(
        &self,
        config: &ValidatedConfig,
        open: F,
    ) -> Result<ScanReport, AnalyzerError>
    where
        S: RecordSource,
        F: FnOnce(&Path) -> Result<S, SourceError> + Send + 'static,
    {
        let addr = config.backend_addr.as_str();
        let name = config.report_name.as_str();

        let mut client = self.pool.checkout(addr).await?;
        let status = ScanStatus::in_progress(MSG_SCANNING, self.clock.now_secs());
        let result = write_status(&mut client, name, status).await;
        self.release(client);
        result?;

        info!(dump = %config.dump_path.display(), top_n = config.top_n, "scanning dump");
        let report = self.scan(config, open).await?;

        // The first connection may have gone stale during a long scan;
        // the pool redials if so
        let mut client = self.pool.checkout(addr).await?;
        let result = self.publish(&mut client, name, &report).await;
        self.release(client);
        result?;

        info!(report = name, records = report.records, "analysis complete");
        Ok(report)
    }

    async fn publish(
        &self,
        client: &mut StoreClient,
        report_name: &str,
        report: &ScanReport,
    ) -> Result<(), AnalyzerError> {
        let status = ScanStatus::in_progress(MSG_PUBLISHING, self.clock.now_secs());
        write_status(client, report_name, status).await?;
        write_aggregates(client, report_name, report).await?;
        write_status(client, report_name, ScanStatus::success(self.clock.now_secs())).await
    }

    async fn scan<S, F>(&self, config: &ValidatedConfig, open: F) -> Result<ScanReport, AnalyzerError>
    where
        S: RecordSource,
        F: FnOnce(&Path) -> Result<S, SourceError> + Send + 'static,
    {
        let path = config.dump_path.clone();
        let filter = config.key_filter.clone();
        let top_n = config.top_n;
        let separator = config.separator.clone();
        let clock = self.clock.clone();

        let worker = tokio::task::spawn_blocking(move || -> Result<ScanReport, SourceError> {
            let source = open(&path)?;
            match filter {
                Some(filter) => {
                    let mut source = FilteredSource::new(source, filter);
                    analysis::scan(&mut source, top_n, &separator, clock)
                }
                None => {
                    let mut source = source;
                    analysis::scan(&mut source, top_n, &separator, clock)
                }
            }
        });

        match worker.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(AnalyzerError::Worker(e.to_string())),
        }
    }

    fn release(&self, client: StoreClient) {
        let addr = client.addr().to_string();
        if let Err(e) = self.pool.checkin(client) {
            warn!(addr = %addr, error = %e, "could not return client to pool");
        }
    }

    /// Best effort; a failure here is only logged
    async fn publish_failure(&self, addr: &str, report_name: &str, err: &AnalyzerError) {
        if addr.is_empty() {
            return;
        }
        let status = err.status(self.clock.now_secs());
        let result = match self.pool.checkout(addr).await {
            Ok(mut client) => {
                let result = write_status(&mut client, report_name, status).await;
                self.release(client);
                result
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(addr, error = %e, "could not publish failure status");
        }
    }
}

async fn write_status(
    client: &mut StoreClient,
    report_name: &str,
    status: ScanStatus,
) -> Result<(), AnalyzerError> {
    let value = serde_json::to_string(&status)?;
    client
        .set_ex(&ReportKey::Status.key_for(report_name), &value, REPORT_TTL_SECS)
        .await?;
    Ok(())
}

async fn write_json<T: Serialize>(
    client: &mut StoreClient,
    key: ReportKey,
    report_name: &str,
    value: &T,
) -> Result<(), AnalyzerError> {
    let value = serde_json::to_string(value)?;
    client
        .set_ex(&key.key_for(report_name), &value, REPORT_TTL_SECS)
        .await?;
    Ok(())
}

/// Replace a sorted set with `members`, scored by size
async fn replace_sorted_set(
    client: &mut StoreClient,
    key: &str,
    members: Vec<(u64, String)>,
) -> Result<(), AnalyzerError> {
    client.del(key).await?;
    for (size, member) in &members {
        let score = i64::try_from(*size).unwrap_or(i64::MAX);
        client.zadd(key, score, member).await?;
    }
    client.expire(key, REPORT_TTL_SECS).await?;
    Ok(())
}

async fn write_aggregates(
    client: &mut StoreClient,
    report_name: &str,
    report: &ScanReport,
) -> Result<(), AnalyzerError> {
    write_json(client, ReportKey::ExpiryCount, report_name, &report.expiration.counts_by_code()).await?;
    write_json(client, ReportKey::ExpiryMemory, report_name, &report.expiration.sizes_by_code()).await?;
    write_json(client, ReportKey::TypeCount, report_name, &report.types.counts_by_name()).await?;
    write_json(client, ReportKey::TypeMemory, report_name, &report.types.sizes_by_name()).await?;

    let big_keys = report
        .big_keys
        .iter()
        .map(|entry| Ok((entry.size, serde_json::to_string(&BigKeyPayload::from(entry))?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    replace_sorted_set(client, &ReportKey::BigKeys.key_for(report_name), big_keys).await?;

    let prefixes = report
        .prefixes
        .iter()
        .map(|stat| Ok((stat.size, serde_json::to_string(&PrefixPayload::from(stat))?)))
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    replace_sorted_set(client, &ReportKey::Prefixes.key_for(report_name), prefixes).await?;

    info!(
        report = report_name,
        big_keys = report.big_keys.len(),
        prefixes = report.prefixes.len(),
        "aggregates published"
    );
    Ok(())
}
