// crates/bench-results-api/src/lib.rs
// ============================================================================
// Module: Bench Results API
// Description: HTTP surface for the benchmark results pipeline.
// Purpose: Expose ingestion, amendment, query, deletion, and health endpoints.
// Dependencies: axum, axum-server, bench-results-core, bench-results-config
// ============================================================================

//! ## Overview
//! The API crate maps HTTP requests onto the core pipeline. Each request runs
//! in one store transaction on a blocking worker; routing, auth, and body
//! limits are enforced before any transaction begins.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::StartupAuditEvent;
pub use audit::StderrAuditSink;
pub use auth::AuthGate;
pub use error::ApiError;
pub use handlers::ApiState;
pub use handlers::router;
pub use server::ApiServer;
pub use server::ApiServerError;
pub use server::StoreHandle;
