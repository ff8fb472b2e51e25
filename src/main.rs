//! rdb-insight: analyze a snapshot dump and publish the results
//!
//! Usage: `rdb-insight [config.toml]`
//!
//! Without a config file, settings come from `RDB_*` environment variables
//! (see `config`). The big-key list is optionally also written as CSV.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use rdb_insight::config::AnalyzerConfig;
use rdb_insight::error::AnalyzerError;
use rdb_insight::observability::{init_tracing, LogFormat};
use rdb_insight::publish::{write_big_keys_csv, Publisher};
use rdb_insight::{StorePool, SystemClock};
use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "rdb-insight failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AnalyzerError> {
    let config = match std::env::args().nth(1) {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::from_env()?,
    };

    let pool_config = match config.validate() {
        Ok(validated) => validated.pool_config(),
        // The publisher reports the problem; the pool only needs timeouts
        Err(_) => rdb_insight::PoolConfig {
            password: config.backend_password.clone(),
            io_timeout: config.io_timeout,
            idle_timeout: config.idle_timeout,
            ..rdb_insight::PoolConfig::default()
        },
    };
    let pool = Arc::new(StorePool::new(pool_config));
    let publisher = Publisher::new(pool.clone(), SystemClock);

    let result = publisher.run(&config).await;
    pool.close().await;
    let report = result?;

    if let Some(path) = &config.csv_output {
        let file = File::create(path).map_err(AnalyzerError::Report)?;
        write_big_keys_csv(BufWriter::new(file), &report.big_keys).map_err(AnalyzerError::Report)?;
        info!(path = %path.display(), rows = report.big_keys.len(), "csv report written");
    }
    Ok(())
}
