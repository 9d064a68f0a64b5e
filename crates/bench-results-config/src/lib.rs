// crates/bench-results-config/src/lib.rs
// ============================================================================
// Module: Bench Results Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for bench-results.toml semantics.
// Dependencies: bench-results-core, serde, toml
// ============================================================================

//! ## Overview
//! `bench-results-config` defines the configuration model for the results
//! service: listener, shared auth token, store backend, and commit
//! resolution. Validation is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
