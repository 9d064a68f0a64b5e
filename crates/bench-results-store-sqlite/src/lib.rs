// crates/bench-results-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Results Store
// Description: Pooled SQLite backend for the benchmark results pipeline.
// Purpose: Provide single-node persistence with conflict-tolerant inserts.
// Dependencies: bench-results-core, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`TransactionSource`] built on a
//! bounded `r2d2` pool. Write transactions begin with `BEGIN IMMEDIATE`, so
//! writers are serialized by the database lock; entity inserts still use
//! `ON CONFLICT DO NOTHING` so a duplicate natural key never surfaces as an
//! error. Security posture: stored rows are untrusted and decoded fail-closed.
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
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use transaction::SqliteTransaction;
