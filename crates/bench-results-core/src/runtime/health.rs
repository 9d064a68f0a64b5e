// crates/bench-results-core/src/runtime/health.rs
// ============================================================================
// Module: Health Probe
// Description: Store reachability check inside a disposable transaction.
// Purpose: Report whether the store answers a trivial read.
// Dependencies: crate::{core, interfaces, runtime::coordinator}
// ============================================================================

//! ## Overview
//! The probe begins a read-only transaction, lists benchmarks, and always
//! rolls back. It never mutates state and never holds the transaction open
//! beyond the read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::error::RequestError;
use crate::core::model::HealthReport;
use crate::interfaces::StoreTransaction;
use crate::interfaces::TransactionMode;
use crate::interfaces::TransactionSource;
use crate::runtime::coordinator::CancellationFlag;
use crate::runtime::coordinator::Disposition;
use crate::runtime::coordinator::TransactionCoordinator;

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Store reachability probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthProbe;

impl HealthProbe {
    /// Runs the probe and returns the report together with the failure, if any.
    #[must_use]
    pub fn check<S: TransactionSource>(
        coordinator: &TransactionCoordinator<S>,
    ) -> (HealthReport, Option<RequestError>) {
        let cancellation = CancellationFlag::new();
        let outcome = coordinator.execute(TransactionMode::ReadOnly, &cancellation, |tx| {
            tx.list_benchmarks()
                .map_err(|err| RequestError::store("Could not list benchmarks", &err))?;
            Ok(Disposition::Rollback(()))
        });
        let report = HealthReport {
            database_responds: outcome.is_ok(),
        };
        (report, outcome.err())
    }

    /// Runs the probe and returns only the report.
    #[must_use]
    pub fn probe<S: TransactionSource>(coordinator: &TransactionCoordinator<S>) -> HealthReport {
        Self::check(coordinator).0
    }
}
