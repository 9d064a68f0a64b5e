// crates/bench-results-core/src/core/error.rs
// ============================================================================
// Module: Bench Results Request Errors
// Description: Request-visible failure taxonomy for the core pipeline.
// Purpose: Separate client faults from server faults and keep store detail private.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every handler in the pipeline fails with a [`RequestError`]. Client faults
//! carry an explanation that is safe to return verbatim. Server faults carry a
//! generic explanation plus a private `detail` that is only written to the
//! audit log. Any error causes the enclosing transaction to roll back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Request Errors
// ============================================================================

/// Request-visible failure raised by the core pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Malformed or mismatched client input.
    #[error("{0}")]
    BadRequest(String),
    /// A referenced run set or run does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Stored data contradicts the request (for example a product commit change).
    #[error("{0}")]
    Conflict(String),
    /// Unexpected store or serialization failure.
    #[error("{explanation}")]
    Internal {
        /// Client-facing explanation.
        explanation: String,
        /// Private failure detail for the audit log.
        detail: String,
    },
    /// The store could not hand out a transaction; the request may be retried.
    #[error("{explanation}")]
    Unavailable {
        /// Client-facing explanation.
        explanation: String,
        /// Private failure detail for the audit log.
        detail: String,
    },
    /// The request was abandoned before the handler completed.
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Builds a bad-request error.
    #[must_use]
    pub fn bad_request(explanation: impl Into<String>) -> Self {
        Self::BadRequest(explanation.into())
    }

    /// Builds a not-found error.
    #[must_use]
    pub fn not_found(explanation: impl Into<String>) -> Self {
        Self::NotFound(explanation.into())
    }

    /// Builds an internal error from a client explanation and private detail.
    #[must_use]
    pub fn internal(explanation: impl Into<String>, detail: impl ToString) -> Self {
        Self::Internal {
            explanation: explanation.into(),
            detail: detail.to_string(),
        }
    }

    /// Maps a store failure into a request error with the given explanation.
    ///
    /// Unavailable stores stay retryable; every other store failure is internal.
    #[must_use]
    pub fn store(explanation: impl Into<String>, err: &StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => Self::Unavailable {
                explanation: explanation.into(),
                detail: detail.clone(),
            },
            StoreError::Db(_) | StoreError::Invalid(_) => Self::internal(explanation, err),
        }
    }

    /// Returns the client-facing explanation.
    #[must_use]
    pub fn explanation(&self) -> &str {
        match self {
            Self::BadRequest(explanation)
            | Self::NotFound(explanation)
            | Self::Conflict(explanation)
            | Self::Internal {
                explanation, ..
            }
            | Self::Unavailable {
                explanation, ..
            } => explanation,
            Self::Cancelled => "Request cancelled",
        }
    }

    /// Returns the private failure detail for server faults.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Internal {
                detail, ..
            }
            | Self::Unavailable {
                detail, ..
            } => Some(detail),
            _ => None,
        }
    }

    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal {
                ..
            } => "internal",
            Self::Unavailable {
                ..
            } => "unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for client faults.
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::NotFound(_) | Self::Conflict(_))
    }
}
