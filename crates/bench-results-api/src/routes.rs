// crates/bench-results-api/src/routes.rs
// ============================================================================
// Module: Route Table
// Description: Static mapping from path and method to endpoints.
// Purpose: Classify requests before auth and body handling.
// Dependencies: axum, bench-results-core
// ============================================================================

//! ## Overview
//! Resolution happens in two steps so status codes follow a fixed order:
//! [`resolve_family`] answers 404 for unknown paths and 405 for methods the
//! path family never accepts; auth runs next; [`resolve_endpoint`] then parses
//! segment counts and ids and answers 400 for malformed shapes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::Method;
use bench_results_core::RunId;
use bench_results_core::RunSetId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Path family below `/api`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFamily {
    /// `/api/runset[/{id}]`.
    RunSet,
    /// `/api/run/{id}`.
    Run,
    /// `/api/runsets`.
    RunSets,
    /// `/api/health`.
    Health,
}

impl RouteFamily {
    /// Returns true when the family accepts the method for some path shape.
    #[must_use]
    pub fn allows(self, method: &Method) -> bool {
        match self {
            Self::RunSet => {
                method == Method::PUT
                    || method == Method::GET
                    || method == Method::POST
                    || method == Method::DELETE
            }
            Self::Run => method == Method::POST,
            Self::RunSets | Self::Health => method == Method::GET,
        }
    }

    /// Returns the `Allow` header value for the family.
    #[must_use]
    pub const fn allowed_methods(self) -> &'static str {
        match self {
            Self::RunSet => "PUT, GET, POST, DELETE",
            Self::Run => "POST",
            Self::RunSets | Self::Health => "GET",
        }
    }

    /// Returns true when requests to the family must carry the token.
    #[must_use]
    pub const fn requires_auth(self) -> bool {
        !matches!(self, Self::Health)
    }
}

/// Fully resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `PUT /api/runset`.
    CreateRunSet,
    /// `GET /api/runset/{id}`.
    GetRunSet(RunSetId),
    /// `POST /api/runset/{id}`.
    AmendRunSet(RunSetId),
    /// `DELETE /api/runset/{id}`.
    DeleteRunSet(RunSetId),
    /// `POST /api/run/{id}`.
    AppendResults(RunId),
    /// `GET /api/runsets`.
    ListRunSets,
    /// `GET /api/health`.
    Health,
}

impl Endpoint {
    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreateRunSet => "create_run_set",
            Self::GetRunSet(_) => "get_run_set",
            Self::AmendRunSet(_) => "amend_run_set",
            Self::DeleteRunSet(_) => "delete_run_set",
            Self::AppendResults(_) => "append_results",
            Self::ListRunSets => "list_run_sets",
            Self::Health => "health",
        }
    }

    /// Returns true when the endpoint reads a JSON body.
    #[must_use]
    pub const fn has_body(self) -> bool {
        matches!(self, Self::CreateRunSet | Self::AmendRunSet(_) | Self::AppendResults(_))
    }
}

/// Routing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Unknown path.
    NoSuchEndpoint,
    /// Known path family, unsupported method.
    MethodNotAllowed(RouteFamily),
    /// Known path family with a malformed shape.
    BadPath(String),
}

/// Path family together with the segments after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyMatch<'a> {
    /// Matched family.
    pub family: RouteFamily,
    /// Segments following the family name.
    pub rest: Vec<&'a str>,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the path family and checks the method against it.
///
/// # Errors
///
/// Returns [`RouteError::NoSuchEndpoint`] for unknown paths and
/// [`RouteError::MethodNotAllowed`] for methods the family never accepts.
pub fn resolve_family<'a>(method: &Method, path: &'a str) -> Result<FamilyMatch<'a>, RouteError> {
    let mut segments = path.strip_prefix('/').unwrap_or(path).split('/');
    if segments.next() != Some("api") {
        return Err(RouteError::NoSuchEndpoint);
    }
    let family = match segments.next() {
        Some("runset") => RouteFamily::RunSet,
        Some("run") => RouteFamily::Run,
        Some("runsets") => RouteFamily::RunSets,
        Some("health") => RouteFamily::Health,
        _ => return Err(RouteError::NoSuchEndpoint),
    };
    if !family.allows(method) {
        return Err(RouteError::MethodNotAllowed(family));
    }
    Ok(FamilyMatch {
        family,
        rest: segments.collect(),
    })
}

/// Resolves the endpoint from an accepted family match.
///
/// # Errors
///
/// Returns [`RouteError::BadPath`] when the segment count or id is invalid.
pub fn resolve_endpoint(method: &Method, matched: &FamilyMatch<'_>) -> Result<Endpoint, RouteError> {
    let rest = matched.rest.as_slice();
    match (matched.family, rest) {
        (RouteFamily::RunSet, []) if method == Method::PUT => Ok(Endpoint::CreateRunSet),
        (RouteFamily::RunSet, [raw]) if method != Method::PUT => {
            let id = parse_id(raw).and_then(RunSetId::from_raw).ok_or_else(|| {
                RouteError::BadPath(format!("Invalid run set id: {raw}"))
            })?;
            if method == Method::GET {
                Ok(Endpoint::GetRunSet(id))
            } else if method == Method::POST {
                Ok(Endpoint::AmendRunSet(id))
            } else {
                Ok(Endpoint::DeleteRunSet(id))
            }
        }
        (RouteFamily::Run, [raw]) => parse_id(raw)
            .and_then(RunId::from_raw)
            .map(Endpoint::AppendResults)
            .ok_or_else(|| RouteError::BadPath(format!("Invalid run id: {raw}"))),
        (RouteFamily::RunSets, []) => Ok(Endpoint::ListRunSets),
        (RouteFamily::Health, []) => Ok(Endpoint::Health),
        _ => Err(RouteError::BadPath("Invalid number of path segments".to_string())),
    }
}

/// Parses a decimal id segment.
fn parse_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
