// crates/bench-results-api/src/error.rs
// ============================================================================
// Module: API Errors
// Description: HTTP status mapping for request failures.
// Purpose: Render `{"Explanation": ...}` bodies without leaking internals.
// Dependencies: axum, bench-results-core, serde, thiserror
// ============================================================================

//! ## Overview
//! [`ApiError`] extends the core request errors with transport-level
//! rejections. Server faults keep their private detail for the audit log and
//! show clients only the generic explanation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::ALLOW;
use axum::http::header::RETRY_AFTER;
use axum::response::IntoResponse;
use axum::response::Response;
use bench_results_core::RequestError;
use serde::Serialize;
use thiserror::Error;

use crate::routes::RouteError;
use crate::routes::RouteFamily;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Seconds clients should wait before retrying an unavailable store.
const RETRY_AFTER_SECONDS: &str = "1";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// HTTP-visible request failure.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Failure raised by the core pipeline.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Missing or wrong token.
    #[error("Auth token invalid")]
    Unauthorized,
    /// Known path, unsupported method.
    #[error("Method not allowed")]
    MethodNotAllowed(RouteFamily),
    /// Unknown path.
    #[error("No such endpoint")]
    NoSuchEndpoint,
    /// Body exceeds the configured limit.
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

impl From<RouteError> for ApiError {
    fn from(error: RouteError) -> Self {
        match error {
            RouteError::NoSuchEndpoint => Self::NoSuchEndpoint,
            RouteError::MethodNotAllowed(family) => Self::MethodNotAllowed(family),
            RouteError::BadPath(explanation) => Self::Request(RequestError::BadRequest(explanation)),
        }
    }
}

impl ApiError {
    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Request(RequestError::BadRequest(_) | RequestError::Conflict(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Request(RequestError::NotFound(_)) | Self::NoSuchEndpoint => StatusCode::NOT_FOUND,
            Self::Request(
                RequestError::Internal {
                    ..
                }
                | RequestError::Unavailable {
                    ..
                }
                | RequestError::Cancelled,
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Request(error) => error.kind(),
            Self::Unauthorized => "unauthorized",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::NoSuchEndpoint => "no_such_endpoint",
            Self::PayloadTooLarge(_) => "payload_too_large",
        }
    }

    /// Returns the private failure detail for server faults.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Request(error) => error.detail(),
            _ => None,
        }
    }

    /// Returns the client-facing explanation.
    #[must_use]
    pub fn explanation(&self) -> String {
        match self {
            Self::Request(error) => error.explanation().to_string(),
            other => other.to_string(),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    /// Client-facing explanation.
    explanation: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            explanation: self.explanation(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        match &self {
            Self::MethodNotAllowed(family) => {
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(family.allowed_methods()));
            }
            Self::Request(RequestError::Unavailable {
                ..
            }) => {
                response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
            }
            _ => {}
        }
        response
    }
}
