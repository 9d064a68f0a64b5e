// crates/bench-results-core/src/runtime/coordinator.rs
// ============================================================================
// Module: Transaction Coordinator
// Description: Wraps each request handler in exactly one store transaction.
// Purpose: Commit only on an explicit success signal and roll back otherwise.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The coordinator acquires one transaction per request, runs the handler,
//! and then commits or rolls back. A handler signals success by returning
//! [`Disposition::Commit`]; reads that must never commit return
//! [`Disposition::Rollback`]. Errors, cancellation, and rollback dispositions
//! all roll back unconditionally. Before committing, the coordinator claims
//! the commit on the [`CancellationFlag`]; once claimed, cancellation is
//! refused and the caller must wait for the real outcome.
//!
//! Security posture: a failure to acquire a transaction is reported as a
//! retryable unavailability and no handler code runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use crate::core::error::RequestError;
use crate::interfaces::StoreError;
use crate::interfaces::StoreTransaction;
use crate::interfaces::TransactionMode;
use crate::interfaces::TransactionSource;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// The request is still running and may be cancelled.
const RUNNING: u8 = 0;
/// The coordinator has started committing; cancellation no longer applies.
const COMMITTING: u8 = 1;
/// The request was abandoned; the coordinator must not commit.
const CANCELLED: u8 = 2;

/// Request-scoped cancellation flag shared between the HTTP task and the store worker.
///
/// # Invariants
/// - Cancellation and commit are mutually exclusive: exactly one of
///   [`CancellationFlag::cancel`] and [`CancellationFlag::begin_commit`] can
///   win the transition out of the running state.
#[derive(Debug, Clone)]
pub struct CancellationFlag {
    /// Shared running, committing, or cancelled state.
    state: Arc<AtomicU8>,
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RUNNING)),
        }
    }
}

impl CancellationFlag {
    /// Creates a flag in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the request as abandoned.
    ///
    /// Returns false when the coordinator already started committing; the
    /// caller must then wait for the real outcome instead of reporting failure.
    pub fn cancel(&self) -> bool {
        match self.state.compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => true,
            Err(current) => current == CANCELLED,
        }
    }

    /// Claims the commit; returns false when the request was already abandoned.
    pub fn begin_commit(&self) -> bool {
        self.state.compare_exchange(RUNNING, COMMITTING, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    /// Returns true once the request was abandoned.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Returns true once the coordinator claimed the commit.
    #[must_use]
    pub fn is_committing(&self) -> bool {
        self.state.load(Ordering::SeqCst) == COMMITTING
    }
}

// ============================================================================
// SECTION: Disposition
// ============================================================================

/// Handler outcome telling the coordinator what to do with the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition<T> {
    /// The handler succeeded and its writes must be committed.
    Commit(T),
    /// The handler succeeded but the transaction must be rolled back.
    Rollback(T),
}

impl<T> Disposition<T> {
    /// Returns the carried value.
    pub fn into_inner(self) -> T {
        match self {
            Self::Commit(value) | Self::Rollback(value) => value,
        }
    }
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Runs handlers inside store transactions.
#[derive(Debug)]
pub struct TransactionCoordinator<S> {
    /// Transaction source backed by a bounded pool.
    source: Arc<S>,
}

impl<S> Clone for TransactionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: TransactionSource> TransactionCoordinator<S> {
    /// Creates a coordinator over the given transaction source.
    #[must_use]
    pub const fn new(source: Arc<S>) -> Self {
        Self {
            source,
        }
    }

    /// Returns the underlying transaction source.
    #[must_use]
    pub const fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Runs `handler` inside one transaction.
    ///
    /// The transaction commits only when the handler returns
    /// [`Disposition::Commit`] and the request has not been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Unavailable`] when no transaction can be begun,
    /// [`RequestError::Cancelled`] when the request was abandoned, the
    /// handler's error, or [`RequestError::Internal`] when the commit fails.
    pub fn execute<T, F>(
        &self,
        mode: TransactionMode,
        cancellation: &CancellationFlag,
        handler: F,
    ) -> Result<T, RequestError>
    where
        F: FnOnce(&mut S::Transaction) -> Result<Disposition<T>, RequestError>,
    {
        if cancellation.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        let mut transaction = self.source.begin(mode).map_err(|err| RequestError::Unavailable {
            explanation: "Could not begin transaction".to_string(),
            detail: err.to_string(),
        })?;
        match handler(&mut transaction) {
            Ok(Disposition::Commit(value)) => {
                if !cancellation.begin_commit() {
                    return finish_rollback(transaction, Err(RequestError::Cancelled));
                }
                transaction
                    .commit()
                    .map_err(|err| RequestError::internal("Could not commit transaction", err))?;
                Ok(value)
            }
            Ok(Disposition::Rollback(value)) => finish_rollback(transaction, Ok(value)),
            Err(err) => finish_rollback(transaction, Err(err)),
        }
    }
}

// ============================================================================
// SECTION: Rollback
// ============================================================================

/// Rolls the transaction back and folds a rollback failure into the outcome.
///
/// A failed rollback leaves the connection in an unknown state, so the
/// request becomes a server fault carrying both the rollback failure and the
/// original outcome in its private detail.
fn finish_rollback<Tx, T>(
    transaction: Tx,
    outcome: Result<T, RequestError>,
) -> Result<T, RequestError>
where
    Tx: StoreTransaction,
{
    match transaction.rollback() {
        Ok(()) => outcome,
        Err(failure) => Err(rollback_failure(&failure, outcome.err())),
    }
}

/// Builds the error reported when a rollback fails.
fn rollback_failure(failure: &StoreError, original: Option<RequestError>) -> RequestError {
    match original {
        Some(
            RequestError::Internal {
                explanation,
                detail,
            },
        ) => RequestError::Internal {
            explanation,
            detail: format!("{detail}; rollback failed: {failure}"),
        },
        Some(
            RequestError::Unavailable {
                explanation,
                detail,
            },
        ) => RequestError::Unavailable {
            explanation,
            detail: format!("{detail}; rollback failed: {failure}"),
        },
        Some(other) => RequestError::internal(
            "Could not roll back transaction",
            format!("{failure}; request failed with {}: {other}", other.kind()),
        ),
        None => RequestError::internal("Could not roll back transaction", failure),
    }
}
