// crates/bench-results-core/tests/model.rs
// ============================================================================
// Module: Data Model Tests
// Description: Value equality, amendment merge, validation, and wire names.
// ============================================================================
//! ## Overview
//! Exercises the pure data-model helpers without a store.

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

use bench_results_core::Config;
use bench_results_core::Machine;
use bench_results_core::Product;
use bench_results_core::ProductRef;
use bench_results_core::PullRequestDescriptor;
use bench_results_core::RequestError;
use bench_results_core::RunDescriptor;
use bench_results_core::RunResult;
use bench_results_core::RunSetDescriptor;
use bench_results_core::RunSetId;
use bench_results_core::RunSetReceipt;
use bench_results_core::RunId;
use bench_results_core::Timestamp;
use bench_results_core::product_sets_equal;
use proptest::prelude::*;
use serde_json::json;

fn product(name: &str, commit: &str) -> Product {
    Product {
        name: name.to_string(),
        version: "main".to_string(),
        commit: commit.to_string(),
    }
}

fn descriptor() -> RunSetDescriptor {
    RunSetDescriptor {
        main_product: ProductRef {
            name: "mono".to_string(),
            version: "abcdef1".to_string(),
        },
        secondary_products: Vec::new(),
        machine: Machine {
            name: "bench-01".to_string(),
            architecture: "amd64".to_string(),
        },
        config: Config {
            name: "default".to_string(),
            executable: None,
            environment_variables: BTreeMap::new(),
            options: Vec::new(),
        },
        started_at: Timestamp::parse("2024-03-01T10:00:00Z").unwrap(),
        finished_at: None,
        build_url: None,
        log_urls: BTreeMap::new(),
        timed_out_benchmarks: BTreeSet::new(),
        crashed_benchmarks: BTreeSet::new(),
        pull_request: None,
        runs: vec![RunDescriptor {
            results: vec![RunResult {
                benchmark: "fib".to_string(),
                metric: "time".to_string(),
                unit: "ms".to_string(),
                value: 12.5,
            }],
        }],
    }
}

#[test]
fn product_equality_ignores_version_reference() {
    let mut left = product("mono", "abcdef1");
    let right = product("mono", "abcdef1");
    left.version = "refs/heads/main".to_string();
    assert!(left.is_same_as(&right));
    assert!(!left.is_same_as(&product("mono", "1234567")));
    assert!(!left.is_same_as(&product("llvm", "abcdef1")));
}

#[test]
fn product_sets_compare_unordered() {
    let left = vec![product("a", "1111111"), product("b", "2222222")];
    let right = vec![product("b", "2222222"), product("a", "1111111")];
    assert!(product_sets_equal(&left, &right));
    assert!(!product_sets_equal(&left, &right[..1]));
    assert!(!product_sets_equal(&left, &[product("a", "1111111"), product("b", "3333333")]));
}

#[test]
fn machine_and_config_compare_by_name() {
    let machine = Machine {
        name: "bench-01".to_string(),
        architecture: "amd64".to_string(),
    };
    let other_arch = Machine {
        name: "bench-01".to_string(),
        architecture: "arm64".to_string(),
    };
    assert!(machine.is_same_as(&other_arch));
    let config = descriptor().config;
    let mut tuned = config.clone();
    tuned.options.push("--llvm".to_string());
    assert!(config.is_same_as(&tuned));
    tuned.name = "llvm".to_string();
    assert!(!config.is_same_as(&tuned));
}

#[test]
fn merge_unions_sets_and_keeps_earliest_start() {
    let mut stored = descriptor();
    stored.crashed_benchmarks.insert("fib".to_string());
    stored.build_url = Some("https://ci/1".to_string());
    let mut amendment = descriptor();
    amendment.started_at = Timestamp::parse("2024-03-01T09:00:00Z").unwrap();
    amendment.finished_at = Some(Timestamp::parse("2024-03-01T11:00:00Z").unwrap());
    amendment.crashed_benchmarks.insert("nbody".to_string());
    amendment.timed_out_benchmarks.insert("graph4".to_string());

    let mut merged = stored.aggregates();
    merged.merge_amendment(&amendment.aggregates());

    assert_eq!(merged.started_at, amendment.started_at);
    assert_eq!(merged.finished_at, amendment.finished_at);
    assert_eq!(merged.build_url.as_deref(), Some("https://ci/1"));
    let crashed: Vec<&str> = merged.crashed_benchmarks.iter().map(String::as_str).collect();
    assert_eq!(crashed, vec!["fib", "nbody"]);
    assert!(merged.timed_out_benchmarks.contains("graph4"));
}

#[test]
fn merge_replaces_provided_urls() {
    let mut stored = descriptor().aggregates();
    stored.log_urls.insert("old".to_string(), "https://logs/old".to_string());
    let mut amendment = descriptor();
    amendment.build_url = Some("https://ci/2".to_string());
    amendment.log_urls.insert("new".to_string(), "https://logs/new".to_string());
    stored.merge_amendment(&amendment.aggregates());
    assert_eq!(stored.build_url.as_deref(), Some("https://ci/2"));
    assert_eq!(stored.log_urls.len(), 1);
    assert!(stored.log_urls.contains_key("new"));
}

#[test]
fn amendment_rejects_pull_request() {
    let mut amendment = descriptor();
    amendment.pull_request = Some(PullRequestDescriptor {
        baseline_run_set_id: RunSetId::new(1),
        url: "https://github.com/o/r/pull/1".to_string(),
    });
    assert_eq!(
        amendment.validate_amendment(),
        Err(RequestError::BadRequest("PullRequest is not allowed for amending".to_string()))
    );
    assert!(amendment.validate().is_ok());
}

#[test]
fn validation_rejects_malformed_descriptors() {
    let mut missing_machine = descriptor();
    missing_machine.machine.name.clear();
    assert!(matches!(missing_machine.validate(), Err(RequestError::BadRequest(_))));

    let mut bad_value = descriptor();
    bad_value.runs[0].results[0].value = f64::NAN;
    assert!(matches!(bad_value.validate(), Err(RequestError::BadRequest(_))));

    let mut backwards = descriptor();
    backwards.finished_at = Some(Timestamp::parse("2024-02-01T00:00:00Z").unwrap());
    assert!(matches!(backwards.validate(), Err(RequestError::BadRequest(_))));

    let mut bad_baseline = descriptor();
    bad_baseline.pull_request = Some(PullRequestDescriptor {
        baseline_run_set_id: RunSetId::new(0),
        url: "https://github.com/o/r/pull/1".to_string(),
    });
    assert!(matches!(bad_baseline.validate(), Err(RequestError::BadRequest(_))));
}

#[test]
fn referenced_benchmarks_include_failure_sets() {
    let mut upload = descriptor();
    upload.crashed_benchmarks.insert("nbody".to_string());
    upload.timed_out_benchmarks.insert("graph4".to_string());
    let names: Vec<&str> = upload.referenced_benchmarks().into_iter().collect();
    assert_eq!(names, vec!["fib", "graph4", "nbody"]);
}

#[test]
fn descriptor_parses_pascal_case_wire_form() {
    let body = json!({
        "MainProduct": {"Name": "mono", "Version": "ABCDEF1"},
        "SecondaryProducts": [{"Name": "llvm", "Version": "1234567"}],
        "Machine": {"Name": "bench-01", "Architecture": "amd64"},
        "Config": {"Name": "default", "Options": ["--optimize"]},
        "StartedAt": "2024-03-01T10:00:00+01:00",
        "BuildURL": "https://ci/1",
        "LogURLs": {"build": "https://logs/1"},
        "CrashedBenchmarks": ["nbody"],
        "PullRequest": {"BaselineRunSetID": 3, "URL": "https://github.com/o/r/pull/9"},
        "Runs": [{"Results": [{"Benchmark": "fib", "Metric": "time", "Value": 1.5}]}]
    });
    let parsed: RunSetDescriptor = serde_json::from_value(body).unwrap();
    assert_eq!(parsed.secondary_products.len(), 1);
    assert_eq!(parsed.config.options, vec!["--optimize".to_string()]);
    assert_eq!(parsed.runs[0].results[0].unit, "");
    assert_eq!(parsed.pull_request.map(|pr| pr.baseline_run_set_id), Some(RunSetId::new(3)));
    assert_eq!(parsed.started_at.as_unix_millis(), Some(1_709_283_600_000));
}

#[test]
fn receipt_omits_absent_pull_request() {
    let receipt = RunSetReceipt {
        run_set_id: RunSetId::new(4),
        run_ids: vec![RunId::new(7), RunId::new(8)],
        pull_request_id: None,
    };
    assert_eq!(serde_json::to_value(&receipt).unwrap(), json!({"RunSetID": 4, "RunIDs": [7, 8]}));
}

#[test]
fn timestamp_round_trips_through_millis() {
    let stamp = Timestamp::parse("2024-03-01T10:00:00.123Z").unwrap();
    let millis = stamp.as_unix_millis().unwrap();
    assert_eq!(Timestamp::from_unix_millis(millis), Some(stamp));
}

#[test]
fn timestamp_input_is_truncated_to_millis() {
    let stamp = Timestamp::parse("2024-03-01T10:00:00.123456789Z").unwrap();
    assert_eq!(stamp.to_rfc3339().unwrap(), "2024-03-01T10:00:00.123Z");
    let stored = Timestamp::from_unix_millis(stamp.as_unix_millis().unwrap()).unwrap();
    assert_eq!(stored, stamp);

    let offset: Timestamp = serde_json::from_value(json!("2024-03-01T11:00:00.999999+01:00")).unwrap();
    assert_eq!(offset.as_unix_millis(), Timestamp::parse("2024-03-01T10:00:00.999Z").unwrap().as_unix_millis());
}

#[test]
fn amendment_start_time_compares_at_stored_precision() {
    let mut stored = descriptor().aggregates();
    stored.started_at = Timestamp::from_unix_millis(
        Timestamp::parse("2024-03-01T10:00:00.123Z").unwrap().as_unix_millis().unwrap(),
    )
    .unwrap();
    let mut amendment = descriptor();
    amendment.started_at = Timestamp::parse("2024-03-01T10:00:00.123900Z").unwrap();
    stored.merge_amendment(&amendment.aggregates());
    assert_eq!(stored.started_at.to_rfc3339().unwrap(), "2024-03-01T10:00:00.123Z");
    assert_eq!(stored.started_at, amendment.started_at);
}

proptest! {
    #[test]
    fn product_set_equality_is_order_independent(
        commits in proptest::collection::vec("[0-9a-f]{7}", 0..6),
        rotation in 0usize..6,
    ) {
        let products: Vec<Product> = commits
            .iter()
            .enumerate()
            .map(|(index, commit)| product(&format!("p{index}"), commit))
            .collect();
        let mut rotated = products.clone();
        if !rotated.is_empty() {
            let by = rotation % rotated.len();
            rotated.rotate_left(by);
        }
        prop_assert!(product_sets_equal(&products, &rotated));
        prop_assert!(product_sets_equal(&rotated, &products));
    }
}
