// crates/bench-results-core/src/runtime/memory.rs
// ============================================================================
// Module: Bench Results In-Memory Store
// Description: Snapshot-isolated in-memory transaction source.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! This module provides an in-memory [`TransactionSource`] for tests and
//! local demos. Each transaction works on a private copy of the state; commit
//! publishes the copy only if no other transaction committed in between, so
//! concurrent writers fail instead of losing updates. It is not intended for
//! production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::core::identifiers::PullRequestId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::RunSetId;
use crate::core::model::Config;
use crate::core::model::DeletedCounts;
use crate::core::model::Machine;
use crate::core::model::Product;
use crate::core::model::ProductRef;
use crate::core::model::PullRequest;
use crate::core::model::PullRequestDescriptor;
use crate::core::model::Run;
use crate::core::model::RunResult;
use crate::core::model::RunSet;
use crate::core::model::RunSetAggregates;
use crate::interfaces::NewRunSet;
use crate::interfaces::RunSetListing;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTransaction;
use crate::interfaces::StoredProduct;
use crate::interfaces::TransactionMode;
use crate::interfaces::TransactionSource;

// ============================================================================
// SECTION: State
// ============================================================================

/// Stored run set row.
#[derive(Debug, Clone)]
struct RunSetRow {
    /// Main product id.
    main_product_id: i64,
    /// Secondary product ids in submission order.
    secondary_product_ids: Vec<i64>,
    /// Machine id.
    machine_id: i64,
    /// Config id.
    config_id: i64,
    /// Aggregate fields.
    aggregates: RunSetAggregates,
    /// Own pull request id.
    pull_request_id: Option<PullRequestId>,
}

/// Stored result row.
#[derive(Debug, Clone, Copy)]
struct ResultRow {
    /// Owning run id.
    run_id: i64,
    /// Benchmark id.
    benchmark_id: i64,
    /// Metric id.
    metric_id: i64,
    /// Measured value.
    value: f64,
}

/// Complete store state; every table keyed by row id.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Incremented on every commit.
    version: u64,
    /// Last generated row id.
    last_id: i64,
    /// Machines.
    machines: BTreeMap<i64, Machine>,
    /// Configs.
    configs: BTreeMap<i64, Config>,
    /// Products.
    products: BTreeMap<i64, Product>,
    /// Benchmark names.
    benchmarks: BTreeMap<i64, String>,
    /// Metric `(name, unit)` pairs.
    metrics: BTreeMap<i64, (String, String)>,
    /// Pull requests.
    pull_requests: BTreeMap<i64, PullRequestDescriptor>,
    /// Run sets.
    run_sets: BTreeMap<i64, RunSetRow>,
    /// Runs mapped to their run set.
    runs: BTreeMap<i64, i64>,
    /// Results.
    results: BTreeMap<i64, ResultRow>,
}

impl MemoryState {
    /// Generates the next row id.
    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory transaction source for tests and examples.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    /// Committed state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
    /// When false, `begin` fails as if the store were unreachable.
    available: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates the store becoming reachable or unreachable.
    ///
    /// Open transactions observe the change: their rollback fails while the
    /// store is unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns committed row counts per table, keyed by table name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn row_counts(&self) -> Result<BTreeMap<&'static str, usize>, StoreError> {
        let guard = self.lock()?;
        Ok(BTreeMap::from([
            ("machine", guard.machines.len()),
            ("config", guard.configs.len()),
            ("product", guard.products.len()),
            ("benchmark", guard.benchmarks.len()),
            ("metric", guard.metrics.len()),
            ("pull_request", guard.pull_requests.len()),
            ("run_set", guard.run_sets.len()),
            ("run", guard.runs.len()),
            ("run_result", guard.results.len()),
        ]))
    }

    /// Locks the committed state.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Db("in-memory store mutex poisoned".to_string()))
    }
}

impl TransactionSource for InMemoryStore {
    type Transaction = InMemoryTransaction;

    fn begin(&self, mode: TransactionMode) -> Result<Self::Transaction, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        let working = self.lock()?.clone();
        Ok(InMemoryTransaction {
            state: Arc::clone(&self.state),
            available: Arc::clone(&self.available),
            base_version: working.version,
            working,
            mode,
        })
    }
}

// ============================================================================
// SECTION: In-Memory Transaction
// ============================================================================

/// Transaction over a private copy of the in-memory state.
#[derive(Debug)]
pub struct InMemoryTransaction {
    /// Shared committed state.
    state: Arc<Mutex<MemoryState>>,
    /// Shared reachability switch; rollback fails once it is off.
    available: Arc<AtomicBool>,
    /// Committed version the working copy was taken from.
    base_version: u64,
    /// Private working copy.
    working: MemoryState,
    /// Locking intent.
    mode: TransactionMode,
}

impl InMemoryTransaction {
    /// Rejects writes in read-only transactions.
    fn writable(&mut self) -> Result<&mut MemoryState, StoreError> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(&mut self.working),
            TransactionMode::ReadOnly => {
                Err(StoreError::Db("cannot write in a read-only transaction".to_string()))
            }
        }
    }

    /// Builds the display form of a stored run set.
    fn build_run_set(&self, id: i64, row: &RunSetRow) -> Result<RunSet, StoreError> {
        let state = &self.working;
        let product = |product_id: i64| {
            state
                .products
                .get(&product_id)
                .cloned()
                .ok_or_else(|| StoreError::Invalid(format!("missing product {product_id}")))
        };
        let secondary_products = row
            .secondary_product_ids
            .iter()
            .map(|product_id| product(*product_id))
            .collect::<Result<Vec<_>, _>>()?;
        let pull_request = match row.pull_request_id {
            Some(pull_request_id) => {
                let stored = state.pull_requests.get(&pull_request_id.get()).ok_or_else(|| {
                    StoreError::Invalid(format!("missing pull request {pull_request_id}"))
                })?;
                Some(PullRequest {
                    id: pull_request_id,
                    baseline_run_set_id: stored.baseline_run_set_id,
                    url: stored.url.clone(),
                })
            }
            None => None,
        };
        let aggregates = row.aggregates.clone();
        Ok(RunSet {
            id: RunSetId::new(id),
            main_product: product(row.main_product_id)?,
            secondary_products,
            machine: state
                .machines
                .get(&row.machine_id)
                .cloned()
                .ok_or_else(|| StoreError::Invalid(format!("missing machine {}", row.machine_id)))?,
            config: state
                .configs
                .get(&row.config_id)
                .cloned()
                .ok_or_else(|| StoreError::Invalid(format!("missing config {}", row.config_id)))?,
            started_at: aggregates.started_at,
            finished_at: aggregates.finished_at,
            build_url: aggregates.build_url,
            log_urls: aggregates.log_urls,
            timed_out_benchmarks: aggregates.timed_out_benchmarks,
            crashed_benchmarks: aggregates.crashed_benchmarks,
            pull_request,
            runs: Vec::new(),
        })
    }
}

impl StoreTransaction for InMemoryTransaction {
    fn commit(self) -> Result<(), StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Db("in-memory store mutex poisoned".to_string()))?;
        if guard.version != self.base_version {
            return Err(StoreError::Db(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        let mut working = self.working;
        working.version = self.base_version + 1;
        *guard = working;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store lost during rollback".to_string()));
        }
        Ok(())
    }

    fn find_machine(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.working.machines.iter().find(|(_, machine)| machine.name == name).map(|(id, _)| *id))
    }

    fn insert_machine(&mut self, machine: &Machine) -> Result<Option<i64>, StoreError> {
        if self.find_machine(&machine.name)?.is_some() {
            return Ok(None);
        }
        let state = self.writable()?;
        let id = state.next_id();
        state.machines.insert(id, machine.clone());
        Ok(Some(id))
    }

    fn find_config(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.working.configs.iter().find(|(_, config)| config.name == name).map(|(id, _)| *id))
    }

    fn insert_config(&mut self, config: &Config) -> Result<Option<i64>, StoreError> {
        if self.find_config(&config.name)?.is_some() {
            return Ok(None);
        }
        let state = self.writable()?;
        let id = state.next_id();
        state.configs.insert(id, config.clone());
        Ok(Some(id))
    }

    fn find_product(&mut self, product: &ProductRef) -> Result<Option<StoredProduct>, StoreError> {
        Ok(self
            .working
            .products
            .iter()
            .find(|(_, stored)| stored.name == product.name && stored.version == product.version)
            .map(|(id, stored)| StoredProduct {
                id: *id,
                commit: stored.commit.clone(),
            }))
    }

    fn insert_product(&mut self, product: &Product) -> Result<Option<i64>, StoreError> {
        if self.find_product(&product.reference())?.is_some() {
            return Ok(None);
        }
        let state = self.writable()?;
        let id = state.next_id();
        state.products.insert(id, product.clone());
        Ok(Some(id))
    }

    fn find_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.working.benchmarks.iter().find(|(_, stored)| *stored == name).map(|(id, _)| *id))
    }

    fn insert_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        if self.find_benchmark(name)?.is_some() {
            return Ok(None);
        }
        let state = self.writable()?;
        let id = state.next_id();
        state.benchmarks.insert(id, name.to_string());
        Ok(Some(id))
    }

    fn find_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .working
            .metrics
            .iter()
            .find(|(_, (stored_name, stored_unit))| stored_name == name && stored_unit == unit)
            .map(|(id, _)| *id))
    }

    fn insert_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError> {
        if self.find_metric(name, unit)?.is_some() {
            return Ok(None);
        }
        let state = self.writable()?;
        let id = state.next_id();
        state.metrics.insert(id, (name.to_string(), unit.to_string()));
        Ok(Some(id))
    }

    fn list_benchmarks(&mut self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.working.benchmarks.values().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn run_set_exists(&mut self, id: RunSetId) -> Result<bool, StoreError> {
        Ok(self.working.run_sets.contains_key(&id.get()))
    }

    fn insert_pull_request(
        &mut self,
        pull_request: &PullRequestDescriptor,
    ) -> Result<PullRequestId, StoreError> {
        if !self.working.run_sets.contains_key(&pull_request.baseline_run_set_id.get()) {
            return Err(StoreError::Db("pull request baseline violates foreign key".to_string()));
        }
        let state = self.writable()?;
        let id = state.next_id();
        state.pull_requests.insert(id, pull_request.clone());
        Ok(PullRequestId::new(id))
    }

    fn insert_run_set(&mut self, run_set: &NewRunSet<'_>) -> Result<RunSetId, StoreError> {
        let state = self.writable()?;
        let id = state.next_id();
        state.run_sets.insert(id, RunSetRow {
            main_product_id: run_set.main_product_id,
            secondary_product_ids: run_set.secondary_product_ids.to_vec(),
            machine_id: run_set.machine_id,
            config_id: run_set.config_id,
            aggregates: run_set.aggregates.clone(),
            pull_request_id: run_set.pull_request_id,
        });
        Ok(RunSetId::new(id))
    }

    fn update_run_set(
        &mut self,
        id: RunSetId,
        aggregates: &RunSetAggregates,
    ) -> Result<(), StoreError> {
        let state = self.writable()?;
        let row = state
            .run_sets
            .get_mut(&id.get())
            .ok_or_else(|| StoreError::Db(format!("run set {id} not found for update")))?;
        row.aggregates = aggregates.clone();
        Ok(())
    }

    fn insert_run(&mut self, run_set: RunSetId) -> Result<RunId, StoreError> {
        let state = self.writable()?;
        if !state.run_sets.contains_key(&run_set.get()) {
            return Err(StoreError::Db("run violates foreign key".to_string()));
        }
        let id = state.next_id();
        state.runs.insert(id, run_set.get());
        Ok(RunId::new(id))
    }

    fn insert_result(
        &mut self,
        run: RunId,
        benchmark_id: i64,
        metric_id: i64,
        value: f64,
    ) -> Result<(), StoreError> {
        let state = self.writable()?;
        if !state.runs.contains_key(&run.get()) {
            return Err(StoreError::Db("result violates foreign key".to_string()));
        }
        let id = state.next_id();
        state.results.insert(id, ResultRow {
            run_id: run.get(),
            benchmark_id,
            metric_id,
            value,
        });
        Ok(())
    }

    fn run_exists(&mut self, run: RunId) -> Result<bool, StoreError> {
        Ok(self.working.runs.contains_key(&run.get()))
    }

    fn fetch_run_set(&mut self, id: RunSetId) -> Result<Option<RunSet>, StoreError> {
        match self.working.run_sets.get(&id.get()) {
            Some(row) => self.build_run_set(id.get(), row).map(Some),
            None => Ok(None),
        }
    }

    fn fetch_runs(&mut self, id: RunSetId) -> Result<Vec<Run>, StoreError> {
        let state = &self.working;
        let mut runs = Vec::new();
        for (run_id, _) in state.runs.iter().filter(|(_, run_set)| **run_set == id.get()) {
            let mut results = Vec::new();
            for row in state.results.values().filter(|row| row.run_id == *run_id) {
                let benchmark = state.benchmarks.get(&row.benchmark_id).ok_or_else(|| {
                    StoreError::Invalid(format!("missing benchmark {}", row.benchmark_id))
                })?;
                let (metric, unit) = state.metrics.get(&row.metric_id).ok_or_else(|| {
                    StoreError::Invalid(format!("missing metric {}", row.metric_id))
                })?;
                results.push(RunResult {
                    benchmark: benchmark.clone(),
                    metric: metric.clone(),
                    unit: unit.clone(),
                    value: row.value,
                });
            }
            runs.push(Run {
                id: RunId::new(*run_id),
                results,
            });
        }
        Ok(runs)
    }

    fn list_run_sets(
        &mut self,
        machine: &str,
        config: &str,
    ) -> Result<Vec<RunSetListing>, StoreError> {
        let mut listings = Vec::new();
        for (id, row) in &self.working.run_sets {
            let machine_matches =
                self.working.machines.get(&row.machine_id).is_some_and(|stored| stored.name == machine);
            let config_matches =
                self.working.configs.get(&row.config_id).is_some_and(|stored| stored.name == config);
            if !machine_matches || !config_matches {
                continue;
            }
            let run_count = self.working.runs.values().filter(|run_set| **run_set == *id).count();
            listings.push(RunSetListing {
                run_set: self.build_run_set(*id, row)?,
                run_count: u64::try_from(run_count).unwrap_or(u64::MAX),
            });
        }
        listings.sort_by(|left, right| {
            (left.run_set.started_at, left.run_set.id).cmp(&(right.run_set.started_at, right.run_set.id))
        });
        Ok(listings)
    }

    fn count_baseline_references(&mut self, id: RunSetId) -> Result<u64, StoreError> {
        let count = self
            .working
            .pull_requests
            .values()
            .filter(|pull_request| pull_request.baseline_run_set_id == id)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    fn delete_run_set(&mut self, id: RunSetId) -> Result<DeletedCounts, StoreError> {
        let state = self.writable()?;
        let run_ids: Vec<i64> = state
            .runs
            .iter()
            .filter(|(_, run_set)| **run_set == id.get())
            .map(|(run_id, _)| *run_id)
            .collect();
        let before = state.results.len();
        state.results.retain(|_, row| !run_ids.contains(&row.run_id));
        let deleted_run_metrics = before - state.results.len();
        for run_id in &run_ids {
            state.runs.remove(run_id);
        }
        if let Some(row) = state.run_sets.remove(&id.get())
            && let Some(pull_request_id) = row.pull_request_id
        {
            state.pull_requests.remove(&pull_request_id.get());
        }
        Ok(DeletedCounts {
            deleted_run_metrics: u64::try_from(deleted_run_metrics).unwrap_or(u64::MAX),
            deleted_runs: u64::try_from(run_ids.len()).unwrap_or(u64::MAX),
        })
    }
}
