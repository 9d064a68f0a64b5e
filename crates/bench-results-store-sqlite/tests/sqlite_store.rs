// crates/bench-results-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Schema setup, transactions, and request flows against SQLite.
// ============================================================================
//! ## Overview
//! Opens throwaway databases under temporary directories and drives them
//! through the shared request pipeline.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use bench_results_core::CancellationFlag;
use bench_results_core::Config;
use bench_results_core::Disposition;
use bench_results_core::EntityResolver;
use bench_results_core::IdentityCommitResolver;
use bench_results_core::Machine;
use bench_results_core::ProductRef;
use bench_results_core::PullRequestDescriptor;
use bench_results_core::RequestError;
use bench_results_core::RunDescriptor;
use bench_results_core::RunResult;
use bench_results_core::RunSet;
use bench_results_core::RunSetAmender;
use bench_results_core::RunSetDescriptor;
use bench_results_core::RunSetId;
use bench_results_core::RunSetIngestor;
use bench_results_core::RunSetQuery;
use bench_results_core::RunSetReceipt;
use bench_results_core::StoreTransaction;
use bench_results_core::Timestamp;
use bench_results_core::TransactionCoordinator;
use bench_results_core::TransactionMode;
use bench_results_core::TransactionSource;
use bench_results_store_sqlite::SqliteStore;
use bench_results_store_sqlite::SqliteStoreConfig;
use bench_results_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn open_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(SqliteStoreConfig::new(dir.path().join("results.sqlite"))).unwrap()
}

fn descriptor(runs: usize) -> RunSetDescriptor {
    let mut environment_variables = BTreeMap::new();
    environment_variables.insert("MONO_ENV_OPTIONS".to_string(), "--llvm".to_string());
    RunSetDescriptor {
        main_product: ProductRef {
            name: "mono".to_string(),
            version: "ABCDEF1".to_string(),
        },
        secondary_products: vec![
            ProductRef {
                name: "llvm".to_string(),
                version: "1234567".to_string(),
            },
            ProductRef {
                name: "benchmarker".to_string(),
                version: "7654321".to_string(),
            },
        ],
        machine: Machine {
            name: "bench-01".to_string(),
            architecture: "amd64".to_string(),
        },
        config: Config {
            name: "default".to_string(),
            executable: Some("mono".to_string()),
            environment_variables,
            options: vec!["--optimize=all".to_string(), "--server".to_string()],
        },
        started_at: Timestamp::parse("2024-03-01T10:00:00.250Z").unwrap(),
        finished_at: None,
        build_url: Some("https://ci/1".to_string()),
        log_urls: BTreeMap::new(),
        timed_out_benchmarks: BTreeSet::new(),
        crashed_benchmarks: BTreeSet::new(),
        pull_request: None,
        runs: (0..runs)
            .map(|index| RunDescriptor {
                results: vec![
                    RunResult {
                        benchmark: "fib".to_string(),
                        metric: "time".to_string(),
                        unit: "ms".to_string(),
                        value: 10.0 + f64::from(u32::try_from(index).unwrap()),
                    },
                    RunResult {
                        benchmark: "fib".to_string(),
                        metric: "cache-miss".to_string(),
                        unit: String::new(),
                        value: 0.5,
                    },
                ],
            })
            .collect(),
    }
}

fn ingest(
    coordinator: &TransactionCoordinator<SqliteStore>,
    upload: &RunSetDescriptor,
) -> Result<RunSetReceipt, RequestError> {
    let commits = IdentityCommitResolver;
    let ingestor = RunSetIngestor::new(&commits);
    coordinator.execute(TransactionMode::ReadWrite, &CancellationFlag::new(), |tx| {
        ingestor.ingest(tx, upload).map(Disposition::Commit)
    })
}

fn fetch(
    coordinator: &TransactionCoordinator<SqliteStore>,
    id: RunSetId,
) -> Result<RunSet, RequestError> {
    coordinator.execute(TransactionMode::ReadOnly, &CancellationFlag::new(), |tx| {
        RunSetQuery::fetch_run_set(tx, id, true).map(Disposition::Rollback)
    })
}

fn table_count(dir: &TempDir, table: &str) -> i64 {
    let connection = Connection::open(dir.path().join("results.sqlite")).unwrap();
    connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)).unwrap()
}

// ============================================================================
// SECTION: Schema
// ============================================================================

#[test]
fn open_creates_schema_and_reopens() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    assert!(store.path().ends_with("results.sqlite"));
    drop(store);
    let reopened = open_store(&dir);
    let mut tx = reopened.begin(TransactionMode::ReadOnly).unwrap();
    assert!(tx.list_benchmarks().unwrap().is_empty());
    tx.rollback().unwrap();
}

#[test]
fn open_creates_missing_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("results.sqlite");
    let store = SqliteStore::open(SqliteStoreConfig::new(&path)).unwrap();
    assert!(store.path().exists());
}

#[test]
fn open_rejects_unknown_schema_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.sqlite");
    drop(open_store(&dir));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);
    let err = SqliteStore::open(SqliteStoreConfig::new(&path)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn open_rejects_directory_paths_and_bad_limits() {
    let dir = TempDir::new().unwrap();
    let err = SqliteStore::open(SqliteStoreConfig::new(dir.path())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));

    let mut config = SqliteStoreConfig::new(dir.path().join("results.sqlite"));
    config.max_connections = 0;
    assert!(matches!(SqliteStore::open(config).unwrap_err(), SqliteStoreError::Invalid(_)));
}

#[test]
fn config_parses_with_defaults() {
    let config: SqliteStoreConfig =
        serde_json::from_str(r#"{"path": "/tmp/results.sqlite", "journal_mode": "delete"}"#)
            .unwrap();
    assert_eq!(config.busy_timeout_ms, 5_000);
    assert_eq!(config.max_connections, 8);
    assert_eq!(config.journal_mode.pragma_value(), "delete");
    assert_eq!(config.sync_mode.pragma_value(), "full");
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

#[test]
fn dropped_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    {
        let mut tx = store.begin(TransactionMode::ReadWrite).unwrap();
        assert!(tx.insert_benchmark("fib").unwrap().is_some());
    }
    let mut tx = store.begin(TransactionMode::ReadOnly).unwrap();
    assert_eq!(tx.find_benchmark("fib").unwrap(), None);
}

#[test]
fn conflicting_insert_returns_none() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut tx = store.begin(TransactionMode::ReadWrite).unwrap();
    let first = tx.insert_metric("time", "ms").unwrap();
    assert!(first.is_some());
    assert_eq!(tx.insert_metric("time", "ms").unwrap(), None);
    assert!(tx.insert_metric("time", "s").unwrap().is_some());
    assert_eq!(tx.find_metric("time", "ms").unwrap(), first);
    tx.commit().unwrap();
}

#[test]
fn read_only_transactions_reject_writes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut tx = store.begin(TransactionMode::ReadOnly).unwrap();
    assert!(tx.insert_benchmark("fib").is_err());
}

#[test]
fn concurrent_creators_converge_on_one_row() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(&dir));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let coordinator = TransactionCoordinator::new(store);
                coordinator
                    .execute(TransactionMode::ReadWrite, &CancellationFlag::new(), |tx| {
                        let commits = IdentityCommitResolver;
                        let resolver = EntityResolver::new(&commits);
                        resolver.ensure_benchmark_exists(tx, "fib").map(Disposition::Commit)
                    })
                    .unwrap()
            })
        })
        .collect();
    let ids: BTreeSet<i64> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(table_count(&dir, "benchmark"), 1);
}

// ============================================================================
// SECTION: Request Flows
// ============================================================================

#[test]
fn ingest_round_trips_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let coordinator = TransactionCoordinator::new(Arc::new(open_store(&dir)));
    let mut upload = descriptor(2);
    upload.crashed_benchmarks.insert("nbody".to_string());
    upload.log_urls.insert("build".to_string(), "https://logs/1".to_string());
    let receipt = ingest(&coordinator, &upload).unwrap();
    assert_eq!(receipt.run_ids.len(), 2);

    let run_set = fetch(&coordinator, receipt.run_set_id).unwrap();
    assert_eq!(run_set.main_product.commit, "abcdef1");
    let secondaries: Vec<&str> =
        run_set.secondary_products.iter().map(|product| product.name.as_str()).collect();
    assert_eq!(secondaries, vec!["llvm", "benchmarker"]);
    assert_eq!(run_set.config, upload.config);
    assert_eq!(run_set.started_at, upload.started_at);
    assert_eq!(run_set.log_urls, upload.log_urls);
    assert!(run_set.crashed_benchmarks.contains("nbody"));
    let run_ids: Vec<_> = run_set.runs.iter().map(|run| run.id).collect();
    assert_eq!(run_ids, receipt.run_ids);
    assert_eq!(run_set.runs[1].results, upload.runs[1].results);
    assert_eq!(table_count(&dir, "benchmark"), 2);
}

#[test]
fn failed_ingest_leaves_no_rows() {
    let dir = TempDir::new().unwrap();
    let coordinator = TransactionCoordinator::new(Arc::new(open_store(&dir)));
    let mut upload = descriptor(1);
    upload.pull_request = Some(PullRequestDescriptor {
        baseline_run_set_id: RunSetId::new(41),
        url: "https://github.com/o/r/pull/1".to_string(),
    });
    let err = ingest(&coordinator, &upload).unwrap_err();
    assert!(matches!(err, RequestError::BadRequest(_)));
    for table in ["machine", "config", "product", "benchmark", "metric", "run_set", "run"] {
        assert_eq!(table_count(&dir, table), 0, "{table}");
    }
}

#[test]
fn amend_summaries_and_delete() {
    let dir = TempDir::new().unwrap();
    let coordinator = TransactionCoordinator::new(Arc::new(open_store(&dir)));
    let baseline = ingest(&coordinator, &descriptor(1)).unwrap();

    let mut with_pr = descriptor(3);
    with_pr.started_at = Timestamp::parse("2024-03-02T10:00:00Z").unwrap();
    with_pr.pull_request = Some(PullRequestDescriptor {
        baseline_run_set_id: baseline.run_set_id,
        url: "https://github.com/o/r/pull/9".to_string(),
    });
    let pr_receipt = ingest(&coordinator, &with_pr).unwrap();
    assert!(pr_receipt.pull_request_id.is_some());

    let mut amendment = descriptor(1);
    amendment.secondary_products.reverse();
    amendment.timed_out_benchmarks.insert("graph4".to_string());
    let commits = IdentityCommitResolver;
    let amender = RunSetAmender::new(&commits);
    let amended = coordinator
        .execute(TransactionMode::ReadWrite, &CancellationFlag::new(), |tx| {
            amender.amend(tx, baseline.run_set_id, &amendment).map(Disposition::Commit)
        })
        .unwrap();
    assert_eq!(amended.run_set_id, baseline.run_set_id);

    let summaries = coordinator
        .execute(TransactionMode::ReadOnly, &CancellationFlag::new(), |tx| {
            RunSetQuery::fetch_run_set_summaries(tx, "bench-01", "default")
                .map(Disposition::Rollback)
        })
        .unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, baseline.run_set_id);
    assert_eq!(summaries[0].run_count, 2);
    assert!(!summaries[0].passed);
    assert_eq!(summaries[1].pull_request_id, pr_receipt.pull_request_id);
    assert!(summaries[1].passed);

    let refused = coordinator.execute(TransactionMode::ReadWrite, &CancellationFlag::new(), |tx| {
        RunSetQuery::delete_run_set(tx, baseline.run_set_id).map(Disposition::Commit)
    });
    assert!(matches!(refused, Err(RequestError::BadRequest(_))));

    let counts = coordinator
        .execute(TransactionMode::ReadWrite, &CancellationFlag::new(), |tx| {
            RunSetQuery::delete_run_set(tx, pr_receipt.run_set_id).map(Disposition::Commit)
        })
        .unwrap();
    assert_eq!(counts.deleted_runs, 3);
    assert_eq!(counts.deleted_run_metrics, 6);
    assert_eq!(table_count(&dir, "pull_request"), 0);
    assert!(matches!(
        fetch(&coordinator, pr_receipt.run_set_id),
        Err(RequestError::NotFound(_))
    ));
}
