// crates/bench-results-core/src/lib.rs
// ============================================================================
// Module: Bench Results Core Library
// Description: Public API surface for the benchmark results core.
// Purpose: Expose the data model, store interfaces, and request pipeline.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Bench results core owns the transactional request pipeline behind the
//! results service: entity resolution, run set ingestion and amendment,
//! queries, deletion, and the health probe. It is backend-agnostic and talks
//! to relational stores only through the [`TransactionSource`] and
//! [`StoreTransaction`] interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CommitResolver;
pub use interfaces::NewRunSet;
pub use interfaces::ResolveError;
pub use interfaces::RunSetListing;
pub use interfaces::StoreError;
pub use interfaces::StoreTransaction;
pub use interfaces::StoredProduct;
pub use interfaces::TransactionMode;
pub use interfaces::TransactionSource;
pub use runtime::CancellationFlag;
pub use runtime::Disposition;
pub use runtime::EntityResolver;
pub use runtime::HealthProbe;
pub use runtime::IdentityCommitResolver;
pub use runtime::InMemoryStore;
pub use runtime::InMemoryTransaction;
pub use runtime::ProductSet;
pub use runtime::ResultCatalog;
pub use runtime::RunSetAmender;
pub use runtime::RunSetIngestor;
pub use runtime::RunSetQuery;
pub use runtime::StaticCommitResolver;
pub use runtime::TransactionCoordinator;
