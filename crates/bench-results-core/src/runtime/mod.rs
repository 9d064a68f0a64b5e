// crates/bench-results-core/src/runtime/mod.rs
// ============================================================================
// Module: Bench Results Runtime
// Description: Transactional request pipeline over the store interfaces.
// Purpose: Resolve entities, ingest and amend run sets, answer queries.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the request handlers and the coordinator that
//! wraps each of them in exactly one store transaction. Handlers never commit
//! themselves; they return a [`Disposition`] and the coordinator decides.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod amend;
pub mod commits;
pub mod coordinator;
pub mod health;
pub mod ingest;
pub mod memory;
pub mod query;
pub mod resolver;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use amend::RunSetAmender;
pub use commits::IdentityCommitResolver;
pub use commits::StaticCommitResolver;
pub use coordinator::CancellationFlag;
pub use coordinator::Disposition;
pub use coordinator::TransactionCoordinator;
pub use health::HealthProbe;
pub use ingest::RunSetIngestor;
pub use memory::InMemoryStore;
pub use memory::InMemoryTransaction;
pub use query::RunSetQuery;
pub use resolver::EntityResolver;
pub use resolver::ProductSet;
pub use resolver::ResultCatalog;
