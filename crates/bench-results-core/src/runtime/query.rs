// crates/bench-results-core/src/runtime/query.rs
// ============================================================================
// Module: Run Set Query
// Description: Fetch, list, and delete run sets.
// Purpose: Answer read endpoints and perform all-or-nothing deletions.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Queries run inside the caller's transaction. Fetches return the display
//! form of a run set, optionally with nested runs. Listings return summaries
//! ordered by start time then id. Deletion refuses run sets that other pull
//! requests use as their baseline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::error::RequestError;
use crate::core::identifiers::RunSetId;
use crate::core::model::DeletedCounts;
use crate::core::model::RunSet;
use crate::core::model::RunSetSummary;
use crate::interfaces::StoreTransaction;

// ============================================================================
// SECTION: Query
// ============================================================================

/// Read and delete operations over run sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSetQuery;

impl RunSetQuery {
    /// Fetches a run set; `include_runs` controls whether runs are loaded.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NotFound`] when the run set does not exist and
    /// [`RequestError::Internal`] when the store fails.
    pub fn fetch_run_set<T: StoreTransaction>(
        tx: &mut T,
        id: RunSetId,
        include_runs: bool,
    ) -> Result<RunSet, RequestError> {
        let mut run_set = tx
            .fetch_run_set(id)
            .map_err(|err| RequestError::store("Could not fetch run set", &err))?
            .ok_or_else(|| RequestError::not_found(format!("Run set {id} does not exist")))?;
        if include_runs {
            run_set.runs = tx
                .fetch_runs(id)
                .map_err(|err| RequestError::store("Could not fetch runs", &err))?;
        }
        Ok(run_set)
    }

    /// Lists run set summaries for a machine and config.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadRequest`] when either name is empty and
    /// [`RequestError::Internal`] when the store fails.
    pub fn fetch_run_set_summaries<T: StoreTransaction>(
        tx: &mut T,
        machine: &str,
        config: &str,
    ) -> Result<Vec<RunSetSummary>, RequestError> {
        if machine.is_empty() || config.is_empty() {
            return Err(RequestError::bad_request("Missing machine or config"));
        }
        let listings = tx
            .list_run_sets(machine, config)
            .map_err(|err| RequestError::store("Could not fetch run set summaries", &err))?;
        Ok(listings
            .into_iter()
            .map(|listing| RunSetSummary::from_run_set(listing.run_set, listing.run_count))
            .collect())
    }

    /// Deletes a run set with its runs, results, and own pull request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NotFound`] when the run set does not exist,
    /// [`RequestError::BadRequest`] when it is another pull request's
    /// baseline, and [`RequestError::Internal`] when the store fails.
    pub fn delete_run_set<T: StoreTransaction>(
        tx: &mut T,
        id: RunSetId,
    ) -> Result<DeletedCounts, RequestError> {
        let exists = tx
            .run_set_exists(id)
            .map_err(|err| RequestError::store("Could not fetch run set", &err))?;
        if !exists {
            return Err(RequestError::not_found(format!("Run set {id} does not exist")));
        }
        let references = tx
            .count_baseline_references(id)
            .map_err(|err| RequestError::store("Could not delete run set", &err))?;
        if references > 0 {
            return Err(RequestError::bad_request(format!(
                "Run set {id} is the baseline of {references} pull request(s)"
            )));
        }
        tx.delete_run_set(id).map_err(|err| RequestError::store("Could not delete run set", &err))
    }
}
