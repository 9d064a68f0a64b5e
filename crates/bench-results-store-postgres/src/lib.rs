// crates/bench-results-store-postgres/src/lib.rs
// ============================================================================
// Module: Bench Results Postgres Store
// Description: Postgres-backed transaction source for benchmark results.
// Purpose: Provide durable shared storage for multi-instance deployments.
// Dependencies: bench-results-core, postgres, r2d2, r2d2_postgres
// ============================================================================

//! ## Overview
//! [`PostgresStore`] implements [`TransactionSource`] over a bounded
//! `r2d2_postgres` pool. Transactions run at `READ COMMITTED`; entity creation
//! relies on unique constraints and `INSERT .. ON CONFLICT DO NOTHING` rather
//! than in-process locks.
//!
//! The `postgres` client blocks on its own runtime, so callers running inside
//! an async executor must use the store from a blocking worker.
//!
//! [`TransactionSource`]: bench_results_core::TransactionSource

// ============================================================================
// SECTION: Modules
// ============================================================================

mod schema;
pub mod store;
mod transaction;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use schema::SCHEMA_VERSION;
pub use store::PostgresStore;
pub use store::PostgresStoreConfig;
pub use store::PostgresStoreError;
pub use store::describe_error;
pub use transaction::PostgresTransaction;
