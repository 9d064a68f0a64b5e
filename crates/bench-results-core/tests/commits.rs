// crates/bench-results-core/tests/commits.rs
// ============================================================================
// Module: Commit Resolver Tests
// Description: Identity and static commit resolution.
// ============================================================================
//! ## Overview
//! Validates version-to-commit resolution used by product ensure-exists.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

use bench_results_core::CommitResolver;
use bench_results_core::IdentityCommitResolver;
use bench_results_core::ProductRef;
use bench_results_core::ResolveError;
use bench_results_core::StaticCommitResolver;

fn product(version: &str) -> ProductRef {
    ProductRef {
        name: "mono".to_string(),
        version: version.to_string(),
    }
}

#[test]
fn identity_resolver_normalizes_hex_commits() {
    assert_eq!(IdentityCommitResolver.resolve(&product("ABCDEF1")).unwrap(), "abcdef1");
    let full = "0123456789abcdef0123456789abcdef01234567";
    assert_eq!(IdentityCommitResolver.resolve(&product(full)).unwrap(), full);
}

#[test]
fn identity_resolver_rejects_symbolic_versions() {
    for version in ["main", "v1.2.3", "abc", "zzzzzzz"] {
        assert!(matches!(
            IdentityCommitResolver.resolve(&product(version)),
            Err(ResolveError::UnknownVersion { .. })
        ));
    }
}

#[test]
fn static_resolver_prefers_table_then_falls_back() {
    let resolver = StaticCommitResolver::new().with_commit("mono", "main", "FEDCBA9876");
    assert_eq!(resolver.len(), 1);
    assert_eq!(resolver.resolve(&product("main")).unwrap(), "fedcba9876");
    assert_eq!(resolver.resolve(&product("1234567")).unwrap(), "1234567");
    assert!(resolver.resolve(&product("release")).is_err());
}
