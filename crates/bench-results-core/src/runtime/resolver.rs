// crates/bench-results-core/src/runtime/resolver.rs
// ============================================================================
// Module: Entity Resolver
// Description: Idempotent ensure-exists operations for referenced entities.
// Purpose: Converge concurrent requests on one row per natural key.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Every referenced entity is resolved with the same three steps: read by
//! natural key, otherwise insert with a conflict-tolerant statement, and when
//! the insert reports an existing row (a concurrent request created it
//! first) read again. Duplicate keys therefore never surface as request
//! failures; only genuine store errors do.
//!
//! Products additionally resolve their version reference to a commit before
//! touching the store. A stored product whose commit differs from the freshly
//! resolved one is a conflict and is never overwritten.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::error::RequestError;
use crate::core::model::Config;
use crate::core::model::Machine;
use crate::core::model::Product;
use crate::core::model::ProductRef;
use crate::core::model::RunResult;
use crate::interfaces::CommitResolver;
use crate::interfaces::ResolveError;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTransaction;
use crate::interfaces::StoredProduct;

// ============================================================================
// SECTION: Resolved Sets
// ============================================================================

/// Row ids and resolved commits of a run set's products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSet {
    /// Main product row id.
    pub main_id: i64,
    /// Main product with its resolved commit.
    pub main: Product,
    /// Secondary product row ids in submission order.
    pub secondary_ids: Vec<i64>,
    /// Secondary products in submission order.
    pub secondaries: Vec<Product>,
}

/// Row ids of the benchmarks and metrics referenced by a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultCatalog {
    /// Benchmark ids keyed by name.
    benchmarks: BTreeMap<String, i64>,
    /// Metric ids keyed by `(name, unit)`.
    metrics: BTreeMap<(String, String), i64>,
}

impl ResultCatalog {
    /// Returns the benchmark id for a name.
    #[must_use]
    pub fn benchmark_id(&self, name: &str) -> Option<i64> {
        self.benchmarks.get(name).copied()
    }

    /// Returns the metric id for a `(name, unit)` pair.
    #[must_use]
    pub fn metric_id(&self, name: &str, unit: &str) -> Option<i64> {
        self.metrics.get(&(name.to_string(), unit.to_string())).copied()
    }

    /// Returns the `(benchmark, metric)` ids for a result.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Internal`] when the result references an
    /// entity that was not resolved.
    pub fn keys_for(&self, result: &RunResult) -> Result<(i64, i64), RequestError> {
        let benchmark = self.benchmark_id(&result.benchmark).ok_or_else(|| {
            RequestError::internal(
                "Could not insert result",
                format!("benchmark {} was not resolved", result.benchmark),
            )
        })?;
        let metric = self.metric_id(&result.metric, &result.unit).ok_or_else(|| {
            RequestError::internal(
                "Could not insert result",
                format!("metric {} ({}) was not resolved", result.metric, result.unit),
            )
        })?;
        Ok((benchmark, metric))
    }

    /// Returns the number of resolved benchmarks.
    #[must_use]
    pub fn benchmark_count(&self) -> usize {
        self.benchmarks.len()
    }

    /// Returns the number of resolved metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }
}

// ============================================================================
// SECTION: Entity Resolver
// ============================================================================

/// Ensure-exists operations for machines, products, configs, benchmarks, and metrics.
#[derive(Clone, Copy)]
pub struct EntityResolver<'r> {
    /// Commit lookup collaborator for product versions.
    commits: &'r dyn CommitResolver,
}

impl<'r> EntityResolver<'r> {
    /// Creates a resolver using the given commit lookup.
    #[must_use]
    pub const fn new(commits: &'r dyn CommitResolver) -> Self {
        Self {
            commits,
        }
    }

    /// Ensures the machine exists and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the store fails.
    pub fn ensure_machine_exists<T: StoreTransaction>(
        &self,
        tx: &mut T,
        machine: &Machine,
    ) -> Result<i64, RequestError> {
        ensure_exists(
            tx,
            "machine",
            &machine.name,
            |tx| tx.find_machine(&machine.name),
            |tx| tx.insert_machine(machine),
        )
    }

    /// Ensures the config exists and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the store fails.
    pub fn ensure_config_exists<T: StoreTransaction>(
        &self,
        tx: &mut T,
        config: &Config,
    ) -> Result<i64, RequestError> {
        ensure_exists(
            tx,
            "config",
            &config.name,
            |tx| tx.find_config(&config.name),
            |tx| tx.insert_config(config),
        )
    }

    /// Ensures the benchmark exists and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the store fails.
    pub fn ensure_benchmark_exists<T: StoreTransaction>(
        &self,
        tx: &mut T,
        name: &str,
    ) -> Result<i64, RequestError> {
        ensure_exists(tx, "benchmark", name, |tx| tx.find_benchmark(name), |tx| {
            tx.insert_benchmark(name)
        })
    }

    /// Ensures the metric exists and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the store fails.
    pub fn ensure_metric_exists<T: StoreTransaction>(
        &self,
        tx: &mut T,
        name: &str,
        unit: &str,
    ) -> Result<i64, RequestError> {
        ensure_exists(tx, "metric", name, |tx| tx.find_metric(name, unit), |tx| {
            tx.insert_metric(name, unit)
        })
    }

    /// Resolves the product version and ensures the product exists.
    ///
    /// Returns the row id and the product with its resolved commit.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] when the version cannot be
    /// resolved, [`RequestError::Conflict`] when the stored commit differs,
    /// and [`RequestError::Internal`] when the store fails.
    pub fn ensure_product_exists<T: StoreTransaction>(
        &self,
        tx: &mut T,
        product: &ProductRef,
    ) -> Result<(i64, Product), RequestError> {
        let commit = self.commits.resolve(product).map_err(|err| match err {
            ResolveError::UnknownVersion {
                ..
            } => RequestError::bad_request(err.to_string()),
            ResolveError::Lookup(_) => RequestError::internal("Could not resolve product commit", err),
        })?;
        let resolved = Product {
            name: product.name.clone(),
            version: product.version.clone(),
            commit,
        };
        let failure = |err: StoreError| RequestError::store("Could not ensure product exists", &err);
        if let Some(stored) = tx.find_product(product).map_err(failure)? {
            return accept_stored_product(stored, resolved);
        }
        if let Some(id) = tx.insert_product(&resolved).map_err(failure)? {
            return Ok((id, resolved));
        }
        match tx.find_product(product).map_err(failure)? {
            Some(stored) => accept_stored_product(stored, resolved),
            None => Err(RequestError::internal(
                "Could not ensure product exists",
                format!("product {} {} missing after conflicting insert", product.name, product.version),
            )),
        }
    }

    /// Ensures the main and secondary products exist.
    ///
    /// Distinct products are resolved sorted by `(name, version)` so
    /// concurrent writers insert product rows in the same order whatever the
    /// submission order. The result maps back to submission order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] raised by [`Self::ensure_product_exists`]
    /// in key order.
    pub fn ensure_product_set_exists<T: StoreTransaction>(
        &self,
        tx: &mut T,
        main: &ProductRef,
        secondaries: &[ProductRef],
    ) -> Result<ProductSet, RequestError> {
        let references: BTreeMap<(&str, &str), &ProductRef> = std::iter::once(main)
            .chain(secondaries)
            .map(|product| ((product.name.as_str(), product.version.as_str()), product))
            .collect();
        let mut resolved: BTreeMap<(&str, &str), (i64, Product)> = BTreeMap::new();
        for (key, reference) in references {
            resolved.insert(key, self.ensure_product_exists(tx, reference)?);
        }
        let lookup = |product: &ProductRef| {
            resolved.get(&(product.name.as_str(), product.version.as_str())).cloned().ok_or_else(|| {
                RequestError::internal(
                    "Could not ensure product exists",
                    format!("product {} {} missing from resolved set", product.name, product.version),
                )
            })
        };
        let (main_id, main_product) = lookup(main)?;
        let mut secondary_ids = Vec::with_capacity(secondaries.len());
        let mut secondary_products = Vec::with_capacity(secondaries.len());
        for product in secondaries {
            let (id, product) = lookup(product)?;
            secondary_ids.push(id);
            secondary_products.push(product);
        }
        Ok(ProductSet {
            main_id,
            main: main_product,
            secondary_ids,
            secondaries: secondary_products,
        })
    }

    /// Ensures every referenced benchmark and metric exists.
    ///
    /// `benchmarks` lists names referenced outside results (timed-out and
    /// crashed sets); names and metrics used by `results` are added. Entities
    /// are resolved in key order so concurrent writers lock rows in the same
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the store fails.
    pub fn ensure_benchmarks_and_metrics_exist<'a, T, I>(
        &self,
        tx: &mut T,
        benchmarks: BTreeSet<&'a str>,
        results: I,
    ) -> Result<ResultCatalog, RequestError>
    where
        T: StoreTransaction,
        I: IntoIterator<Item = &'a RunResult>,
    {
        let mut benchmark_names = benchmarks;
        let mut metric_keys: BTreeSet<(&'a str, &'a str)> = BTreeSet::new();
        for result in results {
            benchmark_names.insert(result.benchmark.as_str());
            metric_keys.insert((result.metric.as_str(), result.unit.as_str()));
        }
        let mut catalog = ResultCatalog::default();
        for name in benchmark_names {
            let id = self.ensure_benchmark_exists(tx, name)?;
            catalog.benchmarks.insert(name.to_string(), id);
        }
        for (name, unit) in metric_keys {
            let id = self.ensure_metric_exists(tx, name, unit)?;
            catalog.metrics.insert((name.to_string(), unit.to_string()), id);
        }
        Ok(catalog)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Read, insert-or-ignore, re-read.
fn ensure_exists<T, Find, Insert>(
    tx: &mut T,
    entity: &str,
    key: &str,
    find: Find,
    insert: Insert,
) -> Result<i64, RequestError>
where
    T: StoreTransaction,
    Find: Fn(&mut T) -> Result<Option<i64>, StoreError>,
    Insert: FnOnce(&mut T) -> Result<Option<i64>, StoreError>,
{
    let failure = |err: StoreError| RequestError::store(format!("Could not ensure {entity} exists"), &err);
    if let Some(id) = find(tx).map_err(failure)? {
        return Ok(id);
    }
    if let Some(id) = insert(tx).map_err(failure)? {
        return Ok(id);
    }
    find(tx).map_err(failure)?.ok_or_else(|| {
        RequestError::internal(
            format!("Could not ensure {entity} exists"),
            format!("{entity} {key} missing after conflicting insert"),
        )
    })
}

/// Accepts a stored product when its commit matches the resolved one.
fn accept_stored_product(
    stored: StoredProduct,
    resolved: Product,
) -> Result<(i64, Product), RequestError> {
    if stored.commit != resolved.commit {
        return Err(RequestError::Conflict(format!(
            "Product {} version {} resolved to {} but the database records {}",
            resolved.name, resolved.version, resolved.commit, stored.commit
        )));
    }
    Ok((stored.id, resolved))
}
