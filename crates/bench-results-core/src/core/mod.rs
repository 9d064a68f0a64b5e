// crates/bench-results-core/src/core/mod.rs
// ============================================================================
// Module: Bench Results Core Types
// Description: Canonical benchmark result records and request errors.
// Purpose: Provide stable, serializable types shared by stores and the API.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Core types define run sets, runs, results, and the entities they reference
//! (machines, products, configs, benchmarks, metrics). Wire names follow the
//! `PascalCase` JSON layout that result uploaders already speak.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod codec;
pub mod error;
pub mod identifiers;
pub mod model;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::RequestError;
pub use identifiers::PullRequestId;
pub use identifiers::RunId;
pub use identifiers::RunSetId;
pub use model::Config;
pub use model::DeletedCounts;
pub use model::HealthReport;
pub use model::Machine;
pub use model::Product;
pub use model::ProductRef;
pub use model::PullRequest;
pub use model::PullRequestDescriptor;
pub use model::Run;
pub use model::RunDescriptor;
pub use model::RunResult;
pub use model::RunSet;
pub use model::RunSetAggregates;
pub use model::RunSetDescriptor;
pub use model::RunSetReceipt;
pub use model::RunSetSummary;
pub use model::product_sets_equal;
pub use model::MAX_NAME_BYTES;
pub use time::Timestamp;
