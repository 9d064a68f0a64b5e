// crates/bench-results-core/src/runtime/ingest.rs
// ============================================================================
// Module: Run Set Ingestor
// Description: Creates run sets with their runs and results.
// Purpose: Persist a complete upload inside the caller's transaction.
// Dependencies: crate::{core, interfaces, runtime::resolver}
// ============================================================================

//! ## Overview
//! Ingestion resolves every referenced entity in one fixed order (machine,
//! config, products by key, benchmarks, metrics), optionally records the pull
//! request the run set belongs to, inserts the run set row, and then appends
//! runs and results in submission order. The ingestor never commits; any
//! error leaves the caller's transaction to be rolled back whole.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::error::RequestError;
use crate::core::identifiers::RunId;
use crate::core::identifiers::RunSetId;
use crate::core::model::RunDescriptor;
use crate::core::model::RunResult;
use crate::core::model::RunSetDescriptor;
use crate::core::model::RunSetReceipt;
use crate::interfaces::CommitResolver;
use crate::interfaces::NewRunSet;
use crate::interfaces::StoreTransaction;
use crate::runtime::resolver::EntityResolver;
use crate::runtime::resolver::ResultCatalog;

// ============================================================================
// SECTION: Ingestor
// ============================================================================

/// Creates run sets and appends results to existing runs.
#[derive(Clone, Copy)]
pub struct RunSetIngestor<'r> {
    /// Entity resolver shared by all steps.
    resolver: EntityResolver<'r>,
}

impl<'r> RunSetIngestor<'r> {
    /// Creates an ingestor using the given commit lookup.
    #[must_use]
    pub const fn new(commits: &'r dyn CommitResolver) -> Self {
        Self {
            resolver: EntityResolver::new(commits),
        }
    }

    /// Creates a run set from a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] for malformed descriptors or a
    /// missing pull request baseline, and [`RequestError::Internal`] when the
    /// store fails.
    pub fn ingest<T: StoreTransaction>(
        &self,
        tx: &mut T,
        descriptor: &RunSetDescriptor,
    ) -> Result<RunSetReceipt, RequestError> {
        descriptor.validate()?;
        let machine_id = self.resolver.ensure_machine_exists(tx, &descriptor.machine)?;
        let config_id = self.resolver.ensure_config_exists(tx, &descriptor.config)?;
        let products = self.resolver.ensure_product_set_exists(
            tx,
            &descriptor.main_product,
            &descriptor.secondary_products,
        )?;
        let catalog = self.resolver.ensure_benchmarks_and_metrics_exist(
            tx,
            descriptor.referenced_benchmarks(),
            descriptor.results(),
        )?;

        let pull_request_id = match &descriptor.pull_request {
            Some(pull_request) => {
                let baseline_exists = tx
                    .run_set_exists(pull_request.baseline_run_set_id)
                    .map_err(|err| RequestError::store("Could not insert pull request", &err))?;
                if !baseline_exists {
                    return Err(RequestError::bad_request("Baseline run set does not exist"));
                }
                let id = tx
                    .insert_pull_request(pull_request)
                    .map_err(|err| RequestError::store("Could not insert pull request", &err))?;
                Some(id)
            }
            None => None,
        };

        let aggregates = descriptor.aggregates();
        let run_set_id = tx
            .insert_run_set(&NewRunSet {
                main_product_id: products.main_id,
                secondary_product_ids: &products.secondary_ids,
                machine_id,
                config_id,
                aggregates: &aggregates,
                pull_request_id,
            })
            .map_err(|err| RequestError::store("Could not insert run set", &err))?;
        let run_ids = insert_runs(tx, run_set_id, &descriptor.runs, &catalog)?;

        Ok(RunSetReceipt {
            run_set_id,
            run_ids,
            pull_request_id,
        })
    }

    /// Appends results to an existing run.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NotFound`] when the run does not exist,
    /// [`RequestError::BadRequest`] for malformed results, and
    /// [`RequestError::Internal`] when the store fails.
    pub fn append_results<T: StoreTransaction>(
        &self,
        tx: &mut T,
        run: RunId,
        body: &RunDescriptor,
    ) -> Result<(), RequestError> {
        body.validate()?;
        let exists = tx
            .run_exists(run)
            .map_err(|err| RequestError::store("Could not fetch run", &err))?;
        if !exists {
            return Err(RequestError::not_found(format!("Run {run} does not exist")));
        }
        let catalog =
            self.resolver.ensure_benchmarks_and_metrics_exist(tx, BTreeSet::new(), &body.results)?;
        insert_results(tx, run, &body.results, &catalog)
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Inserts runs in submission order and returns their ids.
pub(crate) fn insert_runs<T: StoreTransaction>(
    tx: &mut T,
    run_set: RunSetId,
    runs: &[RunDescriptor],
    catalog: &ResultCatalog,
) -> Result<Vec<RunId>, RequestError> {
    let mut run_ids = Vec::with_capacity(runs.len());
    for run in runs {
        let run_id = tx
            .insert_run(run_set)
            .map_err(|err| RequestError::store("Could not insert run", &err))?;
        insert_results(tx, run_id, &run.results, catalog)?;
        run_ids.push(run_id);
    }
    Ok(run_ids)
}

/// Inserts results for one run in submission order.
fn insert_results<T: StoreTransaction>(
    tx: &mut T,
    run: RunId,
    results: &[RunResult],
    catalog: &ResultCatalog,
) -> Result<(), RequestError> {
    for result in results {
        let (benchmark_id, metric_id) = catalog.keys_for(result)?;
        tx.insert_result(run, benchmark_id, metric_id, result.value)
            .map_err(|err| RequestError::store("Could not insert result", &err))?;
    }
    Ok(())
}
