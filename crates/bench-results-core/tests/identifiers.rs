// crates/bench-results-core/tests/identifiers.rs
// ============================================================================
// Module: Identifier Tests
// Description: Identifier construction boundaries and wire forms.
// ============================================================================
//! ## Overview
//! Ensures identifiers reject non-positive raw values and serialize as numbers.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

use bench_results_core::RunId;
use bench_results_core::RunSetId;

#[test]
fn from_raw_rejects_zero_and_negative() {
    assert!(RunSetId::from_raw(0).is_none());
    assert!(RunSetId::from_raw(-4).is_none());
    assert_eq!(RunSetId::from_raw(9).map(RunSetId::get), Some(9));
    assert!(RunId::from_raw(0).is_none());
}

#[test]
fn identifiers_serialize_as_numbers() {
    assert_eq!(serde_json::to_string(&RunSetId::new(42)).unwrap(), "42");
    let parsed: RunId = serde_json::from_str("17").unwrap();
    assert_eq!(parsed, RunId::new(17));
}
