// crates/bench-results-api/tests/routes.rs
// ============================================================================
// Module: Route and Auth Tests
// Description: Static route resolution and shared-token checks.
// ============================================================================
//! ## Overview
//! Exercises path classification and the token gate without a server.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use bench_results_api::ApiError;
use bench_results_api::AuthGate;
use bench_results_api::routes::Endpoint;
use bench_results_api::routes::RouteError;
use bench_results_api::routes::RouteFamily;
use bench_results_api::routes::resolve_endpoint;
use bench_results_api::routes::resolve_family;
use bench_results_core::RequestError;
use bench_results_core::RunId;
use bench_results_core::RunSetId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn resolve(method: &Method, path: &str) -> Result<Endpoint, RouteError> {
    let matched = resolve_family(method, path)?;
    resolve_endpoint(method, &matched)
}

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}

// ============================================================================
// SECTION: Routes
// ============================================================================

#[test]
fn resolves_every_endpoint() {
    assert_eq!(resolve(&Method::PUT, "/api/runset").unwrap(), Endpoint::CreateRunSet);
    assert_eq!(
        resolve(&Method::GET, "/api/runset/12").unwrap(),
        Endpoint::GetRunSet(RunSetId::new(12))
    );
    assert_eq!(
        resolve(&Method::POST, "/api/runset/12").unwrap(),
        Endpoint::AmendRunSet(RunSetId::new(12))
    );
    assert_eq!(
        resolve(&Method::DELETE, "/api/runset/12").unwrap(),
        Endpoint::DeleteRunSet(RunSetId::new(12))
    );
    assert_eq!(resolve(&Method::POST, "/api/run/7").unwrap(), Endpoint::AppendResults(RunId::new(7)));
    assert_eq!(resolve(&Method::GET, "/api/runsets").unwrap(), Endpoint::ListRunSets);
    assert_eq!(resolve(&Method::GET, "/api/health").unwrap(), Endpoint::Health);
}

#[test]
fn unknown_paths_are_not_found() {
    for path in ["/", "/api", "/api/", "/api/unknown", "/other/runset/1", "/apix/runset"] {
        assert_eq!(resolve(&Method::GET, path), Err(RouteError::NoSuchEndpoint), "{path}");
    }
}

#[test]
fn unsupported_methods_are_rejected_before_shape_checks() {
    assert_eq!(
        resolve_family(&Method::PATCH, "/api/runset/not-a-number").unwrap_err(),
        RouteError::MethodNotAllowed(RouteFamily::RunSet)
    );
    assert_eq!(
        resolve_family(&Method::GET, "/api/run/1").unwrap_err(),
        RouteError::MethodNotAllowed(RouteFamily::Run)
    );
    assert_eq!(
        resolve_family(&Method::POST, "/api/health").unwrap_err(),
        RouteError::MethodNotAllowed(RouteFamily::Health)
    );
}

#[test]
fn malformed_shapes_are_bad_requests() {
    let cases = [
        (Method::GET, "/api/runset/abc"),
        (Method::GET, "/api/runset/-3"),
        (Method::GET, "/api/runset/0"),
        (Method::GET, "/api/runset/1/2"),
        (Method::GET, "/api/runset/"),
        (Method::GET, "/api/runset"),
        (Method::PUT, "/api/runset/5"),
        (Method::POST, "/api/run"),
        (Method::POST, "/api/run/x"),
        (Method::GET, "/api/runsets/1"),
        (Method::GET, "/api/health/extra"),
    ];
    for (method, path) in cases {
        assert!(matches!(resolve(&method, path), Err(RouteError::BadPath(_))), "{method} {path}");
    }
}

#[test]
fn only_health_skips_auth() {
    assert!(!RouteFamily::Health.requires_auth());
    assert!(RouteFamily::RunSet.requires_auth());
    assert!(RouteFamily::Run.requires_auth());
    assert!(RouteFamily::RunSets.requires_auth());
}

// ============================================================================
// SECTION: Errors
// ============================================================================

#[test]
fn api_errors_map_to_status_codes() {
    assert_eq!(ApiError::from(RouteError::NoSuchEndpoint).status(), StatusCode::NOT_FOUND);
    assert_eq!(
        ApiError::from(RouteError::MethodNotAllowed(RouteFamily::Run)).status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(
        ApiError::from(RouteError::BadPath("bad".to_string())).status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ApiError::PayloadTooLarge(10).status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        ApiError::from(RequestError::Conflict("commit changed".to_string())).status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        ApiError::from(RequestError::not_found("gone")).status(),
        StatusCode::NOT_FOUND
    );
    let internal = ApiError::from(RequestError::internal("Could not insert run", "disk full"));
    assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(internal.explanation(), "Could not insert run");
    assert_eq!(internal.detail(), Some("disk full"));
}

// ============================================================================
// SECTION: Auth
// ============================================================================

#[test]
fn auth_accepts_query_parameter() {
    let gate = AuthGate::new("s3cret");
    let headers = HeaderMap::new();
    assert!(gate.authorize(Some("authToken=s3cret"), &headers));
    assert!(gate.authorize(Some("machine=a&authToken=s3cret&config=b"), &headers));
    assert!(gate.authorize(Some("authToken=s3%63ret"), &headers));
    assert!(!gate.authorize(Some("authToken=wrong"), &headers));
    assert!(!gate.authorize(Some("authtoken=s3cret"), &headers));
    assert!(!gate.authorize(None, &headers));
}

#[test]
fn auth_accepts_token_header() {
    let gate = AuthGate::new("s3cret");
    assert!(gate.authorize(None, &headers_with("token s3cret")));
    assert!(gate.authorize(None, &headers_with("Token s3cret")));
    assert!(!gate.authorize(None, &headers_with("Bearer s3cret")));
    assert!(!gate.authorize(None, &headers_with("token wrong")));
    assert!(!gate.authorize(None, &headers_with("token")));
    assert!(!gate.authorize(None, &headers_with("s3cret")));
}

#[test]
fn auth_rejects_prefixes_and_extensions() {
    let gate = AuthGate::new("s3cret");
    let headers = HeaderMap::new();
    assert!(!gate.authorize(Some("authToken=s3cre"), &headers));
    assert!(!gate.authorize(Some("authToken=s3cret1"), &headers));
    assert!(!gate.authorize(Some("authToken="), &headers));
}

#[test]
fn auth_debug_redacts_token() {
    let gate = AuthGate::new("s3cret");
    let rendered = format!("{gate:?}");
    assert!(!rendered.contains("s3cret"));
}
