// crates/bench-results-core/src/core/model.rs
// ============================================================================
// Module: Bench Results Data Model
// Description: Run sets, runs, results, and the entities they reference.
// Purpose: Define wire and store shapes plus value equality and amendment merge.
// Dependencies: crate::core::{error, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The data model separates descriptors (what uploaders send) from stored
//! records (what queries return). Products arrive as a `(name, version)`
//! reference and are returned with the commit the version resolved to.
//!
//! Identity comparisons used by amendment are explicit value-equality
//! functions: products compare by name and resolved commit, machines and
//! configs by name, and secondary products as an unordered collection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::RequestError;
use crate::core::identifiers::PullRequestId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::RunSetId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum byte length accepted for any entity name.
pub const MAX_NAME_BYTES: usize = 512;

// ============================================================================
// SECTION: Referenced Entities
// ============================================================================

/// Machine a run set was executed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Machine {
    /// Machine name (natural key).
    pub name: String,
    /// CPU architecture label.
    #[serde(default)]
    pub architecture: String,
}

impl Machine {
    /// Returns true when both values name the same machine.
    #[must_use]
    pub fn is_same_as(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Product reference supplied by uploaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductRef {
    /// Product name.
    pub name: String,
    /// Version reference (branch, tag, abbreviated or full commit).
    pub version: String,
}

/// Product with its version resolved to an immutable commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    /// Product name.
    pub name: String,
    /// Version reference the commit was resolved from.
    pub version: String,
    /// Resolved commit identifier.
    pub commit: String,
}

impl Product {
    /// Returns true when both products share name and resolved commit.
    #[must_use]
    pub fn is_same_as(&self, other: &Self) -> bool {
        self.name == other.name && self.commit == other.commit
    }

    /// Returns the reference this product was resolved from.
    #[must_use]
    pub fn reference(&self) -> ProductRef {
        ProductRef {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Returns true when both product lists hold the same `(name, commit)` pairs,
/// ignoring order.
#[must_use]
pub fn product_sets_equal(left: &[Product], right: &[Product]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left_keys: Vec<(&str, &str)> =
        left.iter().map(|product| (product.name.as_str(), product.commit.as_str())).collect();
    let mut right_keys: Vec<(&str, &str)> =
        right.iter().map(|product| (product.name.as_str(), product.commit.as_str())).collect();
    left_keys.sort_unstable();
    right_keys.sort_unstable();
    left_keys == right_keys
}

/// Benchmark configuration a run set was executed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Config name (natural key).
    pub name: String,
    /// Optional executable the benchmarks ran under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Environment variables applied to every run.
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    /// Ordered command-line options.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Config {
    /// Returns true when both values name the same config.
    #[must_use]
    pub fn is_same_as(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

// ============================================================================
// SECTION: Runs and Results
// ============================================================================

/// Single measurement within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunResult {
    /// Benchmark name.
    pub benchmark: String,
    /// Metric name.
    pub metric: String,
    /// Metric unit; empty when unitless.
    #[serde(default)]
    pub unit: String,
    /// Measured value.
    pub value: f64,
}

/// Run supplied by uploaders, also used as the result-append body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunDescriptor {
    /// Results in submission order.
    #[serde(default)]
    pub results: Vec<RunResult>,
}

/// Stored run with its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Run {
    /// Run identifier.
    #[serde(rename = "ID")]
    pub id: RunId,
    /// Results in submission order.
    pub results: Vec<RunResult>,
}

// ============================================================================
// SECTION: Pull Requests
// ============================================================================

/// Pull request linkage supplied when a run set is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDescriptor {
    /// Run set the pull request is compared against.
    #[serde(rename = "BaselineRunSetID")]
    pub baseline_run_set_id: RunSetId,
    /// Pull request URL.
    #[serde(rename = "URL")]
    pub url: String,
}

/// Stored pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request identifier.
    #[serde(rename = "ID")]
    pub id: PullRequestId,
    /// Run set the pull request is compared against.
    #[serde(rename = "BaselineRunSetID")]
    pub baseline_run_set_id: RunSetId,
    /// Pull request URL.
    #[serde(rename = "URL")]
    pub url: String,
}

// ============================================================================
// SECTION: Run Set Aggregates
// ============================================================================

/// Mutable aggregate fields of a run set.
///
/// # Invariants
/// - Amendment only ever widens the benchmark sets; it never removes entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSetAggregates {
    /// Earliest known start time.
    pub started_at: Timestamp,
    /// Latest reported finish time.
    pub finished_at: Option<Timestamp>,
    /// Build URL.
    pub build_url: Option<String>,
    /// Log URLs keyed by label.
    pub log_urls: BTreeMap<String, String>,
    /// Benchmarks that timed out.
    pub timed_out_benchmarks: BTreeSet<String>,
    /// Benchmarks that crashed.
    pub crashed_benchmarks: BTreeSet<String>,
}

impl RunSetAggregates {
    /// Merges an amendment into the stored aggregates.
    ///
    /// Benchmark sets are unioned. Finish time, build URL, and log URLs are
    /// replaced when the amendment provides them. The start time keeps the
    /// earlier of both values.
    pub fn merge_amendment(&mut self, amendment: &Self) {
        self.started_at = self.started_at.min(amendment.started_at);
        if amendment.finished_at.is_some() {
            self.finished_at = amendment.finished_at;
        }
        if amendment.build_url.is_some() {
            self.build_url.clone_from(&amendment.build_url);
        }
        if !amendment.log_urls.is_empty() {
            self.log_urls.clone_from(&amendment.log_urls);
        }
        self.timed_out_benchmarks.extend(amendment.timed_out_benchmarks.iter().cloned());
        self.crashed_benchmarks.extend(amendment.crashed_benchmarks.iter().cloned());
    }
}

// ============================================================================
// SECTION: Run Set Descriptor
// ============================================================================

/// Run set upload used for both creation and amendment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSetDescriptor {
    /// Main product under test.
    pub main_product: ProductRef,
    /// Secondary products, in submission order.
    #[serde(default)]
    pub secondary_products: Vec<ProductRef>,
    /// Machine the runs executed on.
    pub machine: Machine,
    /// Config the runs executed with.
    pub config: Config,
    /// Start time.
    pub started_at: Timestamp,
    /// Finish time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    /// Build URL.
    #[serde(rename = "BuildURL", default, skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    /// Log URLs keyed by label.
    #[serde(rename = "LogURLs", default)]
    pub log_urls: BTreeMap<String, String>,
    /// Benchmarks that timed out.
    #[serde(default)]
    pub timed_out_benchmarks: BTreeSet<String>,
    /// Benchmarks that crashed.
    #[serde(default)]
    pub crashed_benchmarks: BTreeSet<String>,
    /// Optional pull request linkage (creation only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestDescriptor>,
    /// Runs in submission order.
    #[serde(default)]
    pub runs: Vec<RunDescriptor>,
}

impl RunSetDescriptor {
    /// Returns the aggregate fields carried by this descriptor.
    #[must_use]
    pub fn aggregates(&self) -> RunSetAggregates {
        RunSetAggregates {
            started_at: self.started_at,
            finished_at: self.finished_at,
            build_url: self.build_url.clone(),
            log_urls: self.log_urls.clone(),
            timed_out_benchmarks: self.timed_out_benchmarks.clone(),
            crashed_benchmarks: self.crashed_benchmarks.clone(),
        }
    }

    /// Validates a descriptor submitted for run set creation.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] when the descriptor is malformed.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.machine.name.is_empty() || self.config.name.is_empty() {
            return Err(RequestError::bad_request("Missing machine or config"));
        }
        validate_name("machine name", &self.machine.name)?;
        validate_name("config name", &self.config.name)?;
        validate_product(&self.main_product)?;
        for product in &self.secondary_products {
            validate_product(product)?;
        }
        if let Some(finished_at) = self.finished_at
            && finished_at < self.started_at
        {
            return Err(RequestError::bad_request("FinishedAt must not precede StartedAt"));
        }
        for benchmark in self.timed_out_benchmarks.iter().chain(&self.crashed_benchmarks) {
            validate_name("benchmark name", benchmark)?;
        }
        if let Some(pull_request) = &self.pull_request {
            if !pull_request.baseline_run_set_id.is_positive() {
                return Err(RequestError::bad_request("Baseline run set id must be a positive number"));
            }
            if pull_request.url.is_empty() {
                return Err(RequestError::bad_request("Pull request URL must not be empty"));
            }
        }
        for run in &self.runs {
            validate_results(&run.results)?;
        }
        Ok(())
    }

    /// Validates a descriptor submitted as an amendment.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] when a pull request is present or
    /// the descriptor is malformed.
    pub fn validate_amendment(&self) -> Result<(), RequestError> {
        if self.pull_request.is_some() {
            return Err(RequestError::bad_request("PullRequest is not allowed for amending"));
        }
        self.validate()
    }

    /// Returns every benchmark name referenced by runs and benchmark sets.
    #[must_use]
    pub fn referenced_benchmarks(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self
            .runs
            .iter()
            .flat_map(|run| run.results.iter().map(|result| result.benchmark.as_str()))
            .collect();
        names.extend(self.timed_out_benchmarks.iter().map(String::as_str));
        names.extend(self.crashed_benchmarks.iter().map(String::as_str));
        names
    }

    /// Returns every results list carried by the runs, in submission order.
    pub fn results(&self) -> impl Iterator<Item = &RunResult> {
        self.runs.iter().flat_map(|run| run.results.iter())
    }
}

impl RunDescriptor {
    /// Validates a standalone result-append body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] when a result is malformed.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_results(&self.results)
    }
}

// ============================================================================
// SECTION: Stored Run Sets
// ============================================================================

/// Stored run set in display form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSet {
    /// Run set identifier.
    #[serde(rename = "ID")]
    pub id: RunSetId,
    /// Main product with resolved commit.
    pub main_product: Product,
    /// Secondary products in stored order.
    pub secondary_products: Vec<Product>,
    /// Machine the runs executed on.
    pub machine: Machine,
    /// Config the runs executed with.
    pub config: Config,
    /// Start time.
    pub started_at: Timestamp,
    /// Finish time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    /// Build URL.
    #[serde(rename = "BuildURL", default, skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    /// Log URLs keyed by label.
    #[serde(rename = "LogURLs", default)]
    pub log_urls: BTreeMap<String, String>,
    /// Benchmarks that timed out.
    #[serde(default)]
    pub timed_out_benchmarks: BTreeSet<String>,
    /// Benchmarks that crashed.
    #[serde(default)]
    pub crashed_benchmarks: BTreeSet<String>,
    /// Pull request created with this run set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequest>,
    /// Runs in submission order; empty for identity-only fetches.
    #[serde(default)]
    pub runs: Vec<Run>,
}

impl RunSet {
    /// Returns the mutable aggregate fields.
    #[must_use]
    pub fn aggregates(&self) -> RunSetAggregates {
        RunSetAggregates {
            started_at: self.started_at,
            finished_at: self.finished_at,
            build_url: self.build_url.clone(),
            log_urls: self.log_urls.clone(),
            timed_out_benchmarks: self.timed_out_benchmarks.clone(),
            crashed_benchmarks: self.crashed_benchmarks.clone(),
        }
    }

    /// Replaces the mutable aggregate fields.
    pub fn apply_aggregates(&mut self, aggregates: RunSetAggregates) {
        self.started_at = aggregates.started_at;
        self.finished_at = aggregates.finished_at;
        self.build_url = aggregates.build_url;
        self.log_urls = aggregates.log_urls;
        self.timed_out_benchmarks = aggregates.timed_out_benchmarks;
        self.crashed_benchmarks = aggregates.crashed_benchmarks;
    }

    /// Returns true when the identity fields match the amendment's resolved identity.
    #[must_use]
    pub fn has_identity(
        &self,
        main_product: &Product,
        secondary_products: &[Product],
        machine: &Machine,
        config: &Config,
    ) -> bool {
        self.main_product.is_same_as(main_product)
            && product_sets_equal(&self.secondary_products, secondary_products)
            && self.machine.is_same_as(machine)
            && self.config.is_same_as(config)
    }
}

/// Lightweight run set listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSetSummary {
    /// Run set identifier.
    #[serde(rename = "ID")]
    pub id: RunSetId,
    /// Main product with resolved commit.
    pub main_product: Product,
    /// Secondary products in stored order.
    pub secondary_products: Vec<Product>,
    /// Start time.
    pub started_at: Timestamp,
    /// Finish time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    /// Build URL.
    #[serde(rename = "BuildURL", default, skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    /// Pull request created with this run set.
    #[serde(rename = "PullRequestID", default, skip_serializing_if = "Option::is_none")]
    pub pull_request_id: Option<PullRequestId>,
    /// Number of runs recorded.
    pub run_count: u64,
    /// Number of benchmarks that timed out.
    pub timed_out_count: u64,
    /// Number of benchmarks that crashed.
    pub crashed_count: u64,
    /// True when no benchmark timed out or crashed.
    pub passed: bool,
}

impl RunSetSummary {
    /// Builds a summary from an identity-only run set and its run count.
    #[must_use]
    pub fn from_run_set(run_set: RunSet, run_count: u64) -> Self {
        let timed_out_count = u64::try_from(run_set.timed_out_benchmarks.len()).unwrap_or(u64::MAX);
        let crashed_count = u64::try_from(run_set.crashed_benchmarks.len()).unwrap_or(u64::MAX);
        Self {
            id: run_set.id,
            main_product: run_set.main_product,
            secondary_products: run_set.secondary_products,
            started_at: run_set.started_at,
            finished_at: run_set.finished_at,
            build_url: run_set.build_url,
            pull_request_id: run_set.pull_request.map(|pull_request| pull_request.id),
            run_count,
            timed_out_count,
            crashed_count,
            passed: timed_out_count == 0 && crashed_count == 0,
        }
    }
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Identifiers produced by run set creation or amendment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSetReceipt {
    /// Run set identifier.
    #[serde(rename = "RunSetID")]
    pub run_set_id: RunSetId,
    /// Newly inserted run identifiers, in submission order.
    #[serde(rename = "RunIDs")]
    pub run_ids: Vec<RunId>,
    /// Pull request identifier when one was created.
    #[serde(rename = "PullRequestID", default, skip_serializing_if = "Option::is_none")]
    pub pull_request_id: Option<PullRequestId>,
}

/// Row counts removed by a run set deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeletedCounts {
    /// Result rows removed.
    pub deleted_run_metrics: u64,
    /// Run rows removed.
    pub deleted_runs: u64,
}

/// Health probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthReport {
    /// True when the store answered a read inside a transaction.
    pub database_responds: bool,
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Validates an entity name.
fn validate_name(label: &str, value: &str) -> Result<(), RequestError> {
    if value.is_empty() {
        return Err(RequestError::bad_request(format!("{label} must not be empty")));
    }
    if value.len() > MAX_NAME_BYTES {
        return Err(RequestError::bad_request(format!(
            "{label} exceeds {MAX_NAME_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Validates a product reference.
fn validate_product(product: &ProductRef) -> Result<(), RequestError> {
    validate_name("product name", &product.name)?;
    validate_name("product version", &product.version)
}

/// Validates a list of results.
fn validate_results(results: &[RunResult]) -> Result<(), RequestError> {
    for result in results {
        validate_name("benchmark name", &result.benchmark)?;
        validate_name("metric name", &result.metric)?;
        if !result.value.is_finite() {
            return Err(RequestError::bad_request("result value must be finite"));
        }
    }
    Ok(())
}
