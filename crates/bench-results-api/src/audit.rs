// crates/bench-results-api/src/audit.rs
// ============================================================================
// Module: Request Audit Logging
// Description: Structured audit events for HTTP request handling.
// Purpose: Emit JSON-line request and startup records without a logging stack.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every request produces one [`RequestAuditEvent`]. Server-fault details that
//! are hidden from clients are carried here so operators can diagnose them.
//! Startup posture warnings use [`StartupAuditEvent`] through the same sink.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The request succeeded.
    Ok,
    /// The request was rejected or failed.
    Error,
}

/// Per-request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// HTTP method.
    pub method: String,
    /// Endpoint label, or `unmatched` when routing failed.
    pub route: &'static str,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Response status code.
    pub status: u16,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Private failure detail for server faults.
    pub detail: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Handling time in milliseconds.
    pub duration_ms: u128,
}

/// Inputs required to construct a request audit event.
pub struct RequestAuditEventParams {
    /// HTTP method.
    pub method: String,
    /// Endpoint label.
    pub route: &'static str,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Response status code.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Private failure detail for server faults.
    pub detail: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Handling time in milliseconds.
    pub duration_ms: u128,
}

impl RequestAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: RequestAuditEventParams) -> Self {
        let outcome =
            if params.error_kind.is_none() { RequestOutcome::Ok } else { RequestOutcome::Error };
        Self {
            event: "bench_results_request",
            timestamp_ms: now_ms(),
            method: params.method,
            route: params.route,
            peer_ip: params.peer_ip,
            status: params.status,
            outcome,
            error_kind: params.error_kind,
            detail: params.detail,
            request_bytes: params.request_bytes,
            duration_ms: params.duration_ms,
        }
    }
}

/// Startup posture audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct StartupAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Warning kind label.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl StartupAuditEvent {
    /// Creates a startup warning event.
    #[must_use]
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            event: "bench_results_startup",
            timestamp_ms: now_ms(),
            kind,
            message: message.into(),
        }
    }
}

/// Returns the current time in milliseconds since the epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for request events.
pub trait AuditSink: Send + Sync {
    /// Record a request audit event.
    fn record(&self, event: &RequestAuditEvent);

    /// Record a startup posture event.
    fn record_startup(&self, _event: &StartupAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized line.
    fn write_line(&self, payload: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.write_line(&payload);
        }
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.write_line(&payload);
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &RequestAuditEvent) {}
}
