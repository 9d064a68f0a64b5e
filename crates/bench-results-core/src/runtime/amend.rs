// crates/bench-results-core/src/runtime/amend.rs
// ============================================================================
// Module: Run Set Amender
// Description: Appends runs to an existing run set after an identity check.
// Purpose: Let run sets grow across uploads without drifting to another identity.
// Dependencies: crate::{core, interfaces, runtime::{ingest, query, resolver}}
// ============================================================================

//! ## Overview
//! An amendment carries the same shape as a creation upload, minus the pull
//! request. The stored run set is loaded without its runs and its identity
//! (main product, secondary products, machine, config) is compared with the
//! amendment's resolved identity. Only when they match are the aggregate
//! fields merged and the new runs appended.
//!
//! Products, benchmarks, and metrics are resolved in the same order ingestion
//! uses, before the stored run set is read.
//!
//! Merge rules: timed-out and crashed sets are unioned, finish time and URLs
//! are replaced when provided, and the start time keeps the earlier value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::error::RequestError;
use crate::core::identifiers::RunSetId;
use crate::core::model::RunSetDescriptor;
use crate::core::model::RunSetReceipt;
use crate::interfaces::CommitResolver;
use crate::interfaces::StoreTransaction;
use crate::runtime::ingest::insert_runs;
use crate::runtime::query::RunSetQuery;
use crate::runtime::resolver::EntityResolver;

// ============================================================================
// SECTION: Amender
// ============================================================================

/// Amends existing run sets.
#[derive(Clone, Copy)]
pub struct RunSetAmender<'r> {
    /// Entity resolver shared by all steps.
    resolver: EntityResolver<'r>,
}

impl<'r> RunSetAmender<'r> {
    /// Creates an amender using the given commit lookup.
    #[must_use]
    pub const fn new(commits: &'r dyn CommitResolver) -> Self {
        Self {
            resolver: EntityResolver::new(commits),
        }
    }

    /// Amends run set `id` with the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] when the descriptor carries a pull
    /// request, is malformed, or does not match the stored identity;
    /// [`RequestError::NotFound`] when the run set does not exist; and
    /// [`RequestError::Internal`] when the store fails.
    pub fn amend<T: StoreTransaction>(
        &self,
        tx: &mut T,
        id: RunSetId,
        descriptor: &RunSetDescriptor,
    ) -> Result<RunSetReceipt, RequestError> {
        descriptor.validate_amendment()?;
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
        let stored = RunSetQuery::fetch_run_set(tx, id, false)?;
        if !stored.has_identity(
            &products.main,
            &products.secondaries,
            &descriptor.machine,
            &descriptor.config,
        ) {
            return Err(RequestError::bad_request("Parameters do not match database"));
        }

        let mut aggregates = stored.aggregates();
        aggregates.merge_amendment(&descriptor.aggregates());
        tx.update_run_set(id, &aggregates)
            .map_err(|err| RequestError::store("Could not update run set", &err))?;
        let run_ids = insert_runs(tx, id, &descriptor.runs, &catalog)?;

        Ok(RunSetReceipt {
            run_set_id: id,
            run_ids,
            pull_request_id: None,
        })
    }
}
