//! Publisher Integration Tests
//!
//! Runs full analyses against an in-process backend, verifying:
//! - Write order and key names of a successful run
//! - Status transitions (1 → 0, or 1 → -1 on failure)
//! - No aggregate keys on a failed scan
//! - Configuration errors and their reporting

use rdb_insight::analysis::TtlBucket;
use rdb_insight::config::ConfigError;
use rdb_insight::publish::{
    BigKeyPayload, PrefixPayload, Publisher, ReportKey, ScanStatus, MSG_SCANNING, REPORT_TTL_SECS,
};
use rdb_insight::snapshot::{IterSource, ObjectType, SnapshotRecord, SourceError};
use rdb_insight::store::mock::MockBackend;
use rdb_insight::{AnalyzerConfig, AnalyzerError, ManualClock, PoolConfig, StorePool};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const NOW_MS: i64 = 1_700_000_000_000;
const NOW_SECS: i64 = 1_700_000_000;
const REPORT: &str = "10.1.1.1:6379";

fn publisher() -> Publisher<ManualClock> {
    let pool = Arc::new(StorePool::new(PoolConfig {
        io_timeout: Duration::from_millis(500),
        ..PoolConfig::default()
    }));
    Publisher::new(pool, ManualClock::new(NOW_MS))
}

fn write_dump(records: &[SnapshotRecord]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for record in records {
        writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
    }
    file.flush().unwrap();
    file
}

fn config(backend: &MockBackend, dump: &NamedTempFile) -> AnalyzerConfig {
    AnalyzerConfig {
        dump_path: Some(dump.path().to_path_buf()),
        backend_addr: backend.addr().to_string(),
        report_name: Some(REPORT.to_string()),
        ..AnalyzerConfig::default()
    }
}

fn status(backend: &MockBackend, report: &str) -> ScanStatus {
    let raw = backend
        .get(&ReportKey::Status.key_for(report))
        .expect("status key written");
    serde_json::from_str(&raw).unwrap()
}

fn sample_records() -> Vec<SnapshotRecord> {
    vec![
        SnapshotRecord::new(0, "user:1:profile", ObjectType::Hash, 4096).with_element_count(20),
        SnapshotRecord::new(0, "user:2:profile", ObjectType::Hash, 1024)
            .with_element_count(8)
            .with_expire_at_ms(NOW_MS + 1_800_000),
        SnapshotRecord::new(1, "session:abc", ObjectType::String, 300).with_expire_at_ms(NOW_MS - 1),
        SnapshotRecord::new(0, "counter", ObjectType::String, 16),
    ]
}

#[tokio::test]
async fn test_successful_run_write_order() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    let publisher = publisher();

    let report = publisher.run(&config(&backend, &dump)).await.unwrap();
    assert_eq!(report.records, 4);

    let commands = backend.commands();
    let writes: Vec<(&str, &str)> = commands
        .iter()
        .map(|c| (c[0].as_str(), c[1].as_str()))
        .collect();

    let status_key = ReportKey::Status.key_for(REPORT);
    let bk_key = ReportKey::BigKeys.key_for(REPORT);
    let prefix_key = ReportKey::Prefixes.key_for(REPORT);
    let mut expected = vec![
        ("SET", status_key.clone()),
        ("SET", status_key.clone()),
        ("SET", ReportKey::ExpiryCount.key_for(REPORT)),
        ("SET", ReportKey::ExpiryMemory.key_for(REPORT)),
        ("SET", ReportKey::TypeCount.key_for(REPORT)),
        ("SET", ReportKey::TypeMemory.key_for(REPORT)),
        ("DEL", bk_key.clone()),
    ];
    expected.extend(std::iter::repeat(("ZADD", bk_key.clone())).take(4));
    expected.push(("EXPIRE", bk_key.clone()));
    expected.push(("DEL", prefix_key.clone()));
    expected.extend(std::iter::repeat(("ZADD", prefix_key.clone())).take(4));
    expected.push(("EXPIRE", prefix_key.clone()));
    expected.push(("SET", status_key.clone()));

    let expected: Vec<(&str, &str)> = expected.iter().map(|(c, k)| (*c, k.as_str())).collect();
    assert_eq!(writes, expected);

    // Scanning status first, then publishing, then done
    assert!(commands[0][2].contains(MSG_SCANNING));
    let done = status(&backend, REPORT);
    assert_eq!(done, ScanStatus::success(NOW_SECS));

    for key in ReportKey::AGGREGATES {
        assert_eq!(backend.ttl(&key.key_for(REPORT)), Some(REPORT_TTL_SECS));
    }
    assert_eq!(backend.ttl(&status_key), Some(REPORT_TTL_SECS));
}

#[tokio::test]
async fn test_published_aggregates_content() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    publisher().run(&config(&backend, &dump)).await.unwrap();

    let exp_count: BTreeMap<String, u64> =
        serde_json::from_str(&backend.get(&ReportKey::ExpiryCount.key_for(REPORT)).unwrap()).unwrap();
    assert_eq!(exp_count.len(), TtlBucket::COUNT);
    assert_eq!(exp_count["0"], 2);
    assert_eq!(exp_count["1"], 1);
    assert_eq!(exp_count["2"], 1);
    assert_eq!(exp_count["8"], 0);

    let exp_mem: BTreeMap<String, u64> =
        serde_json::from_str(&backend.get(&ReportKey::ExpiryMemory.key_for(REPORT)).unwrap()).unwrap();
    assert_eq!(exp_mem["0"], 4096 + 16);
    assert_eq!(exp_mem["2"], 1024);

    let type_count: BTreeMap<String, u64> =
        serde_json::from_str(&backend.get(&ReportKey::TypeCount.key_for(REPORT)).unwrap()).unwrap();
    assert_eq!(type_count.get("hash"), Some(&2));
    assert_eq!(type_count.get("string"), Some(&2));
    assert_eq!(type_count.get("list"), None);

    let type_mem: BTreeMap<String, u64> =
        serde_json::from_str(&backend.get(&ReportKey::TypeMemory.key_for(REPORT)).unwrap()).unwrap();
    assert_eq!(type_mem["hash"], 5120);

    let big_keys: Vec<BigKeyPayload> = backend
        .zset(&ReportKey::BigKeys.key_for(REPORT))
        .iter()
        .map(|(score, member)| {
            let payload: BigKeyPayload = serde_json::from_str(member).unwrap();
            assert_eq!(*score as u64, payload.size);
            payload
        })
        .collect();
    let keys: Vec<&str> = big_keys.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["counter", "session:abc", "user:2:profile", "user:1:profile"]);
    assert_eq!(big_keys[3].readable_size, "4K");
    assert_eq!(big_keys[3].element_count, 20);
    assert_eq!(big_keys[1].db_index, 1);

    let prefixes: Vec<PrefixPayload> = backend
        .zset(&ReportKey::Prefixes.key_for(REPORT))
        .iter()
        .map(|(_, member)| serde_json::from_str(member).unwrap())
        .collect();
    let names: Vec<&str> = prefixes.iter().map(|p| p.prefix.as_str()).collect();
    assert_eq!(names, vec!["others", "session", "user:2", "user:1"]);
    let others = prefixes.iter().find(|p| p.prefix == "others").unwrap();
    assert_eq!((others.size, others.count), (16, 1));
}

#[tokio::test]
async fn test_leading_separator_keys_group_under_empty_prefix() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&[
        SnapshotRecord::new(0, ":orphan", ObjectType::String, 40),
        SnapshotRecord::new(0, "single", ObjectType::String, 8),
    ]);

    publisher().run(&config(&backend, &dump)).await.unwrap();

    let prefixes: Vec<PrefixPayload> = backend
        .zset(&ReportKey::Prefixes.key_for(REPORT))
        .iter()
        .map(|(_, member)| serde_json::from_str(member).unwrap())
        .collect();
    let names: Vec<&str> = prefixes.iter().map(|p| p.prefix.as_str()).collect();
    assert_eq!(names, vec!["others", ""]);
}

#[tokio::test]
async fn test_decode_error_publishes_failure_only() {
    let backend = MockBackend::start().await.unwrap();
    let mut dump = write_dump(&sample_records()[..2]);
    writeln!(dump, "{{\"db\":0,\"key\":").unwrap();
    dump.flush().unwrap();

    let err = publisher().run(&config(&backend, &dump)).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Source(SourceError::Decode { line: 3, .. })));

    let failed = status(&backend, REPORT);
    assert_eq!(failed.code, -1);
    assert_eq!(failed.msg, err.to_string());

    for key in ReportKey::AGGREGATES {
        assert!(!backend.contains(&key.key_for(REPORT)), "{:?} written", key);
    }
    assert_eq!(backend.command_names(), vec!["SET", "SET"]);
}

#[tokio::test]
async fn test_missing_dump_file_reports_open_error() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&[]);
    let mut config = config(&backend, &dump);
    config.dump_path = Some(dump.path().with_extension("missing"));

    let err = publisher().run(&config).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Source(SourceError::Open { .. })));

    let failed = status(&backend, REPORT);
    assert_eq!(failed.code, -1);
    assert!(failed.msg.starts_with("open rdb "));
}

#[tokio::test]
async fn test_empty_backend_address_does_no_io() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    let mut config = config(&backend, &dump);
    config.backend_addr = String::new();

    let err = publisher().run(&config).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Config(ConfigError::MissingBackendAddr)));
    assert_eq!(backend.connection_count().await, 0);
}

#[tokio::test]
async fn test_separator_count_is_reported() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    let mut config = config(&backend, &dump);
    config.separators = vec![":".to_string(), ".".to_string()];

    let err = publisher().run(&config).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Config(ConfigError::SeparatorCount(2))));

    let failed = status(&backend, REPORT);
    assert_eq!(failed, ScanStatus::failure("only support one separators", NOW_SECS));
    assert_eq!(backend.command_names(), vec!["SET"]);
}

#[tokio::test]
async fn test_invalid_key_filter_is_reported() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    let mut config = config(&backend, &dump);
    config.key_filter = Some("^user:(".to_string());

    let err = publisher().run(&config).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Config(ConfigError::InvalidFilter(_))));

    let failed = status(&backend, REPORT);
    assert_eq!(failed.code, -1);
    assert!(failed.msg.starts_with("invalid key filter: pattern '^user:('"));
    assert_eq!(backend.command_names(), vec!["SET"]);
}

#[tokio::test]
async fn test_backend_error_mid_publish_fails_run() {
    let backend = MockBackend::start().await.unwrap();
    backend.fail_command("ZADD");
    let dump = write_dump(&sample_records());

    let err = publisher().run(&config(&backend, &dump)).await.unwrap_err();
    assert!(matches!(err, AnalyzerError::Store(_)));

    let failed = status(&backend, REPORT);
    assert_eq!(failed.code, -1);
    assert!(failed.msg.contains("injected failure"));
    // Aggregates before the failing write were published; nothing after it
    assert!(backend.contains(&ReportKey::TypeMemory.key_for(REPORT)));
    assert!(!backend.contains(&ReportKey::Prefixes.key_for(REPORT)));
}

#[tokio::test]
async fn test_report_name_defaults_to_backend_address() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    let mut config = config(&backend, &dump);
    config.report_name = None;

    publisher().run(&config).await.unwrap();
    assert_eq!(status(&backend, backend.addr()).code, 0);
}

#[tokio::test]
async fn test_out_of_range_top_n_falls_back_to_100() {
    let backend = MockBackend::start().await.unwrap();
    let records: Vec<SnapshotRecord> = (1..=150u64)
        .map(|size| SnapshotRecord::new(0, format!("k{}", size), ObjectType::String, size))
        .collect();
    let dump = write_dump(&records);
    let mut config = config(&backend, &dump);
    config.top_n = 0;

    let report = publisher().run(&config).await.unwrap();
    assert_eq!(report.big_keys.len(), 100);
    assert_eq!(report.big_keys.last().map(|e| e.size), Some(51));
    assert_eq!(backend.zset(&ReportKey::BigKeys.key_for(REPORT)).len(), 100);
}

#[tokio::test]
async fn test_key_filter_limits_analysis() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&sample_records());
    let mut config = config(&backend, &dump);
    config.key_filter = Some(r"^user:\d+:".to_string());

    let report = publisher().run(&config).await.unwrap();
    assert_eq!(report.records, 2);
    assert!(report.big_keys.iter().all(|e| e.key.starts_with("user:")));
}

#[tokio::test]
async fn test_custom_record_source() {
    let backend = MockBackend::start().await.unwrap();
    let dump = write_dump(&[]);

    let report = publisher()
        .run_with(&config(&backend, &dump), |_| {
            Ok(IterSource::from_records(sample_records()))
        })
        .await
        .unwrap();
    assert_eq!(report.records, 4);
    assert_eq!(status(&backend, REPORT).code, 0);
}
