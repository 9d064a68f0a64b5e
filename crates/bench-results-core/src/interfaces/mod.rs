// crates/bench-results-core/src/interfaces/mod.rs
// ============================================================================
// Module: Bench Results Interfaces
// Description: Backend-agnostic store and commit-resolution interfaces.
// Purpose: Define the contract surfaces used by the request pipeline.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the pipeline reaches the relational store and the
//! commit lookup collaborator without embedding backend details. A
//! [`TransactionSource`] hands out one [`StoreTransaction`] per request; every
//! read and write of that request goes through it.
//!
//! Insert operations are conflict tolerant: when a row with the same natural
//! key already exists they return `Ok(None)` instead of a duplicate-key error,
//! and callers re-read by natural key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::PullRequestId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::RunSetId;
use crate::core::model::Config;
use crate::core::model::DeletedCounts;
use crate::core::model::Machine;
use crate::core::model::Product;
use crate::core::model::ProductRef;
use crate::core::model::PullRequestDescriptor;
use crate::core::model::Run;
use crate::core::model::RunSet;
use crate::core::model::RunSetAggregates;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Store errors surfaced through the transaction interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or a connection could not be acquired.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A statement failed.
    #[error("store error: {0}")]
    Db(String),
    /// Stored data failed validation.
    #[error("store data invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Store Records
// ============================================================================

/// Locking intent for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// The transaction may write; backends take write locks eagerly.
    ReadWrite,
    /// The transaction only reads.
    ReadOnly,
}

/// Product row found by natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProduct {
    /// Row identifier.
    pub id: i64,
    /// Commit the version resolved to when the row was created.
    pub commit: String,
}

/// Row values for a new run set.
#[derive(Debug, Clone, Copy)]
pub struct NewRunSet<'a> {
    /// Main product row id.
    pub main_product_id: i64,
    /// Secondary product row ids in submission order.
    pub secondary_product_ids: &'a [i64],
    /// Machine row id.
    pub machine_id: i64,
    /// Config row id.
    pub config_id: i64,
    /// Aggregate fields.
    pub aggregates: &'a RunSetAggregates,
    /// Pull request created alongside the run set.
    pub pull_request_id: Option<PullRequestId>,
}

/// Listing row: an identity-only run set plus its run count.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSetListing {
    /// Run set without runs.
    pub run_set: RunSet,
    /// Number of runs recorded.
    pub run_count: u64,
}

// ============================================================================
// SECTION: Store Transaction
// ============================================================================

/// One open store transaction.
///
/// # Invariants
/// - Dropping a transaction without calling [`StoreTransaction::commit`] rolls it back.
/// - Conflict-tolerant inserts return `Ok(None)` when the natural key already exists.
pub trait StoreTransaction {
    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails.
    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the rollback statement fails.
    fn rollback(self) -> Result<(), StoreError>
    where
        Self: Sized;

    /// Finds a machine row id by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_machine(&mut self, name: &str) -> Result<Option<i64>, StoreError>;

    /// Inserts a machine unless the name already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails for any reason other than the name conflict.
    fn insert_machine(&mut self, machine: &Machine) -> Result<Option<i64>, StoreError>;

    /// Finds a config row id by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_config(&mut self, name: &str) -> Result<Option<i64>, StoreError>;

    /// Inserts a config unless the name already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails for any reason other than the name conflict.
    fn insert_config(&mut self, config: &Config) -> Result<Option<i64>, StoreError>;

    /// Finds a product row by `(name, version)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_product(&mut self, product: &ProductRef) -> Result<Option<StoredProduct>, StoreError>;

    /// Inserts a resolved product unless `(name, version)` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails for any reason other than the key conflict.
    fn insert_product(&mut self, product: &Product) -> Result<Option<i64>, StoreError>;

    /// Finds a benchmark row id by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError>;

    /// Inserts a benchmark unless the name already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails for any reason other than the name conflict.
    fn insert_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError>;

    /// Finds a metric row id by `(name, unit)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError>;

    /// Inserts a metric unless `(name, unit)` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails for any reason other than the key conflict.
    fn insert_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError>;

    /// Lists benchmark names in name order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_benchmarks(&mut self) -> Result<Vec<String>, StoreError>;

    /// Returns true when the run set exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn run_set_exists(&mut self, id: RunSetId) -> Result<bool, StoreError>;

    /// Inserts a pull request and returns its generated id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_pull_request(
        &mut self,
        pull_request: &PullRequestDescriptor,
    ) -> Result<PullRequestId, StoreError>;

    /// Inserts a run set row with its secondary product links.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_run_set(&mut self, run_set: &NewRunSet<'_>) -> Result<RunSetId, StoreError>;

    /// Overwrites the aggregate fields of a run set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails or no row matched.
    fn update_run_set(
        &mut self,
        id: RunSetId,
        aggregates: &RunSetAggregates,
    ) -> Result<(), StoreError>;

    /// Inserts an empty run for a run set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_run(&mut self, run_set: RunSetId) -> Result<RunId, StoreError>;

    /// Inserts one result row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_result(
        &mut self,
        run: RunId,
        benchmark_id: i64,
        metric_id: i64,
        value: f64,
    ) -> Result<(), StoreError>;

    /// Returns true when the run exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn run_exists(&mut self, run: RunId) -> Result<bool, StoreError>;

    /// Fetches a run set without runs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or stored data is invalid.
    fn fetch_run_set(&mut self, id: RunSetId) -> Result<Option<RunSet>, StoreError>;

    /// Fetches the runs of a run set in id order, each with results in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn fetch_runs(&mut self, id: RunSetId) -> Result<Vec<Run>, StoreError>;

    /// Lists run sets for a machine and config ordered by start time then id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or stored data is invalid.
    fn list_run_sets(
        &mut self,
        machine: &str,
        config: &str,
    ) -> Result<Vec<RunSetListing>, StoreError>;

    /// Counts pull requests that use the run set as their baseline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn count_baseline_references(&mut self, id: RunSetId) -> Result<u64, StoreError>;

    /// Deletes a run set with its runs, results, secondary product links, and
    /// its own pull request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a delete statement fails.
    fn delete_run_set(&mut self, id: RunSetId) -> Result<DeletedCounts, StoreError>;
}

/// Source of store transactions backed by a bounded connection pool.
pub trait TransactionSource: Send + Sync + 'static {
    /// Transaction type handed out by this source.
    type Transaction: StoreTransaction;

    /// Acquires a connection and begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when no connection can be acquired.
    fn begin(&self, mode: TransactionMode) -> Result<Self::Transaction, StoreError>;
}

// ============================================================================
// SECTION: Commit Resolution
// ============================================================================

/// Commit resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The version reference does not name a commit.
    #[error("cannot resolve version {version} of product {product}")]
    UnknownVersion {
        /// Product name.
        product: String,
        /// Version reference.
        version: String,
    },
    /// The lookup collaborator failed.
    #[error("commit lookup failed: {0}")]
    Lookup(String),
}

/// Resolves product version references to immutable commit identifiers.
pub trait CommitResolver: Send + Sync {
    /// Resolves a product reference to a commit identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the version cannot be resolved.
    fn resolve(&self, product: &ProductRef) -> Result<String, ResolveError>;
}
