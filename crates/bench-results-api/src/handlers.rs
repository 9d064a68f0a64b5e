// crates/bench-results-api/src/handlers.rs
// ============================================================================
// Module: Request Handlers
// Description: Dispatch from resolved endpoints to the core pipeline.
// Purpose: Run each request's store work in one transaction off the executor.
// Dependencies: axum, bench-results-core, serde_json, tokio, url
// ============================================================================

//! ## Overview
//! A single fallback handler owns routing so the status order stays fixed:
//! 404, 405, 401, 400 for path shape, then 413 for oversized bodies. Store
//! work runs on a blocking worker under a timeout. Dropping the request
//! future or hitting the timeout raises the cancellation flag, which makes the
//! coordinator roll back instead of committing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::body::to_bytes;
use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::response::IntoResponse;
use axum::response::Response;
use bench_results_core::CancellationFlag;
use bench_results_core::CommitResolver;
use bench_results_core::Disposition;
use bench_results_core::HealthProbe;
use bench_results_core::HealthReport;
use bench_results_core::RequestError;
use bench_results_core::RunDescriptor;
use bench_results_core::RunSetAmender;
use bench_results_core::RunSetDescriptor;
use bench_results_core::RunSetIngestor;
use bench_results_core::RunSetQuery;
use bench_results_core::TransactionCoordinator;
use bench_results_core::TransactionMode;
use bench_results_core::TransactionSource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::audit::AuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::RequestAuditEvent;
use crate::audit::RequestAuditEventParams;
use crate::auth::AuthGate;
use crate::error::ApiError;
use crate::routes::Endpoint;
use crate::routes::resolve_endpoint;
use crate::routes::resolve_family;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum request body size (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(360);

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared handler state.
pub struct ApiState<S> {
    /// Transaction coordinator over the store.
    coordinator: TransactionCoordinator<S>,
    /// Commit resolver for product versions.
    commits: Arc<dyn CommitResolver>,
    /// Shared-token gate.
    auth: AuthGate,
    /// Request audit sink.
    audit: Arc<dyn AuditSink>,
    /// Maximum request body size.
    max_body_bytes: usize,
    /// Per-request timeout for store work.
    request_timeout: Duration,
}

impl<S: TransactionSource> ApiState<S> {
    /// Creates handler state with default limits and no audit output.
    #[must_use]
    pub fn new(store: Arc<S>, commits: Arc<dyn CommitResolver>, auth: AuthGate) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            commits,
            auth,
            audit: Arc::new(NoopAuditSink),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Sets the maximum request body size.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Builds the HTTP router over the given state.
pub fn router<S: TransactionSource>(state: Arc<ApiState<S>>) -> Router {
    Router::new().fallback(dispatch::<S>).with_state(state)
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Handler result carrying the response and any failure to audit.
struct Reply {
    /// Response sent to the client.
    response: Response,
    /// Failure recorded for responses that still report a status body.
    failure: Option<ApiError>,
}

impl Reply {
    /// Builds a JSON reply.
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        Self {
            response: (status, Json(value)).into_response(),
            failure: None,
        }
    }
}

/// Audit facts collected while handling one request.
struct RequestTrace {
    /// Endpoint label.
    route: &'static str,
    /// Body size in bytes.
    request_bytes: usize,
}

/// Entry point for every request.
async fn dispatch<S: TransactionSource>(
    State(state): State<Arc<ApiState<S>>>,
    request: Request,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let mut trace = RequestTrace {
        route: "unmatched",
        request_bytes: 0,
    };
    let (response, failure) = match handle(&state, request, &mut trace).await {
        Ok(reply) => (reply.response, reply.failure),
        Err(error) => (error.clone().into_response(), Some(error)),
    };
    state.audit.record(&RequestAuditEvent::new(RequestAuditEventParams {
        method,
        route: trace.route,
        peer_ip,
        status: response.status().as_u16(),
        error_kind: failure.as_ref().map(ApiError::kind),
        detail: failure.as_ref().and_then(|error| error.detail().map(str::to_string)),
        request_bytes: trace.request_bytes,
        duration_ms: started.elapsed().as_millis(),
    }));
    response
}

/// Routes, authenticates, and runs one request.
async fn handle<S: TransactionSource>(
    state: &ApiState<S>,
    request: Request,
    trace: &mut RequestTrace,
) -> Result<Reply, ApiError> {
    let (parts, body) = request.into_parts();
    let matched = resolve_family(&parts.method, parts.uri.path())?;
    if matched.family.requires_auth() && !state.auth.authorize(parts.uri.query(), &parts.headers) {
        return Err(ApiError::Unauthorized);
    }
    let endpoint = resolve_endpoint(&parts.method, &matched)?;
    trace.route = endpoint.label();
    let bytes = if endpoint.has_body() {
        read_body(body, &parts.headers, state.max_body_bytes).await?
    } else {
        Bytes::new()
    };
    trace.request_bytes = bytes.len();

    match endpoint {
        Endpoint::CreateRunSet => {
            let descriptor: RunSetDescriptor = parse_json(&bytes)?;
            let receipt = run_store(state, move |coordinator, commits, cancellation| {
                coordinator.execute(TransactionMode::ReadWrite, cancellation, |tx| {
                    RunSetIngestor::new(commits).ingest(tx, &descriptor).map(Disposition::Commit)
                })
            })
            .await?;
            Ok(Reply::json(StatusCode::CREATED, &receipt))
        }
        Endpoint::GetRunSet(id) => {
            let run_set = run_store(state, move |coordinator, _, cancellation| {
                coordinator.execute(TransactionMode::ReadOnly, cancellation, |tx| {
                    RunSetQuery::fetch_run_set(tx, id, true).map(Disposition::Rollback)
                })
            })
            .await?;
            Ok(Reply::json(StatusCode::OK, &run_set))
        }
        Endpoint::AmendRunSet(id) => {
            let descriptor: RunSetDescriptor = parse_json(&bytes)?;
            let receipt = run_store(state, move |coordinator, commits, cancellation| {
                coordinator.execute(TransactionMode::ReadWrite, cancellation, |tx| {
                    RunSetAmender::new(commits).amend(tx, id, &descriptor).map(Disposition::Commit)
                })
            })
            .await?;
            Ok(Reply::json(StatusCode::CREATED, &receipt))
        }
        Endpoint::DeleteRunSet(id) => {
            let counts = run_store(state, move |coordinator, _, cancellation| {
                coordinator.execute(TransactionMode::ReadWrite, cancellation, |tx| {
                    RunSetQuery::delete_run_set(tx, id).map(Disposition::Commit)
                })
            })
            .await?;
            Ok(Reply::json(StatusCode::OK, &counts))
        }
        Endpoint::AppendResults(run) => {
            let body: RunDescriptor = parse_json(&bytes)?;
            run_store(state, move |coordinator, commits, cancellation| {
                coordinator.execute(TransactionMode::ReadWrite, cancellation, |tx| {
                    RunSetIngestor::new(commits).append_results(tx, run, &body).map(Disposition::Commit)
                })
            })
            .await?;
            Ok(Reply::json(StatusCode::CREATED, &serde_json::json!({})))
        }
        Endpoint::ListRunSets => {
            let (machine, config) = summary_filter(parts.uri.query());
            let summaries = run_store(state, move |coordinator, _, cancellation| {
                coordinator.execute(TransactionMode::ReadOnly, cancellation, |tx| {
                    RunSetQuery::fetch_run_set_summaries(tx, &machine, &config)
                        .map(Disposition::Rollback)
                })
            })
            .await?;
            Ok(Reply::json(StatusCode::OK, &summaries))
        }
        Endpoint::Health => Ok(health(state).await),
    }
}

/// Runs the health probe; probe failures still produce a report body.
async fn health<S: TransactionSource>(state: &ApiState<S>) -> Reply {
    let outcome = run_store(state, |coordinator, _, _| Ok(HealthProbe::check(coordinator))).await;
    let (report, failure) = match outcome {
        Ok((report, failure)) => (report, failure.map(ApiError::from)),
        Err(error) => (
            HealthReport {
                database_responds: false,
            },
            Some(error),
        ),
    };
    let status =
        if report.database_responds { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let mut reply = Reply::json(status, &report);
    reply.failure = failure;
    reply
}

// ============================================================================
// SECTION: Store Execution
// ============================================================================

/// Raises the cancellation flag when the request future is dropped.
struct CancelOnDrop(CancellationFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let _ = self.0.cancel();
    }
}

/// Runs store work on a blocking worker with the request timeout applied.
async fn run_store<S, T, F>(state: &ApiState<S>, work: F) -> Result<T, ApiError>
where
    S: TransactionSource,
    T: Send + 'static,
    F: FnOnce(&TransactionCoordinator<S>, &dyn CommitResolver, &CancellationFlag) -> Result<T, RequestError>
        + Send
        + 'static,
{
    let coordinator = state.coordinator.clone();
    let commits = Arc::clone(&state.commits);
    let cancellation = CancellationFlag::new();
    let _guard = CancelOnDrop(cancellation.clone());
    let worker_flag = cancellation.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        work(&coordinator, commits.as_ref(), &worker_flag)
    });
    let joined = match tokio::time::timeout(state.request_timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if cancellation.cancel() => {
            return Err(RequestError::Unavailable {
                explanation: "Request timed out".to_string(),
                detail: format!("store work exceeded {} ms", state.request_timeout.as_millis()),
            }
            .into());
        }
        // The worker already claimed the commit; report what it actually did.
        Err(_) => task.await,
    };
    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(RequestError::internal("Request handler failed", err).into()),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the request body up to `limit` bytes.
async fn read_body(body: Body, headers: &HeaderMap, limit: usize) -> Result<Bytes, ApiError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > limit) {
        return Err(ApiError::PayloadTooLarge(limit));
    }
    to_bytes(body, limit).await.map_err(|_| ApiError::PayloadTooLarge(limit))
}

/// Parses a JSON request body.
fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|err| {
        RequestError::bad_request(format!("Could not parse request body: {err}")).into()
    })
}

/// Extracts the `machine` and `config` query parameters.
fn summary_filter(query: Option<&str>) -> (String, String) {
    let mut machine = String::new();
    let mut config = String::new();
    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "machine" => machine = value.into_owned(),
            "config" => config = value.into_owned(),
            _ => {}
        }
    }
    (machine, config)
}
