// crates/bench-results-core/src/runtime/commits.rs
// ============================================================================
// Module: Commit Resolvers
// Description: Built-in product version to commit resolvers.
// Purpose: Provide offline commit resolution for deployments without a forge lookup.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`IdentityCommitResolver`] accepts versions that already are hexadecimal
//! commit identifiers and normalizes them to lowercase.
//! [`StaticCommitResolver`] consults a configured `(product, version)` table
//! first and falls back to identity resolution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::model::ProductRef;
use crate::interfaces::CommitResolver;
use crate::interfaces::ResolveError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum accepted commit id length (abbreviated commits).
pub const MIN_COMMIT_HEX_LEN: usize = 7;
/// Maximum accepted commit id length (SHA-256 object ids).
pub const MAX_COMMIT_HEX_LEN: usize = 64;

// ============================================================================
// SECTION: Identity Resolver
// ============================================================================

/// Treats hexadecimal versions as commit ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCommitResolver;

impl CommitResolver for IdentityCommitResolver {
    fn resolve(&self, product: &ProductRef) -> Result<String, ResolveError> {
        if is_commit_hex(&product.version) {
            Ok(product.version.to_ascii_lowercase())
        } else {
            Err(ResolveError::UnknownVersion {
                product: product.name.clone(),
                version: product.version.clone(),
            })
        }
    }
}

/// Returns true when the value looks like a hexadecimal commit id.
#[must_use]
pub fn is_commit_hex(value: &str) -> bool {
    (MIN_COMMIT_HEX_LEN..=MAX_COMMIT_HEX_LEN).contains(&value.len())
        && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}

// ============================================================================
// SECTION: Static Resolver
// ============================================================================

/// Resolves versions from a configured table, then falls back to identity.
#[derive(Debug, Clone, Default)]
pub struct StaticCommitResolver {
    /// Commits keyed by `(product, version)`.
    commits: BTreeMap<(String, String), String>,
}

impl StaticCommitResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mapping; later mappings for the same key replace earlier ones.
    pub fn insert(
        &mut self,
        product: impl Into<String>,
        version: impl Into<String>,
        commit: impl Into<String>,
    ) {
        let commit: String = commit.into();
        self.commits.insert((product.into(), version.into()), commit.to_ascii_lowercase());
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_commit(
        mut self,
        product: impl Into<String>,
        version: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        self.insert(product, version, commit);
        self
    }

    /// Returns the number of configured mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Returns true when no mappings are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

impl CommitResolver for StaticCommitResolver {
    fn resolve(&self, product: &ProductRef) -> Result<String, ResolveError> {
        let key = (product.name.clone(), product.version.clone());
        match self.commits.get(&key) {
            Some(commit) => Ok(commit.clone()),
            None => IdentityCommitResolver.resolve(product),
        }
    }
}
