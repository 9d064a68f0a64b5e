// crates/bench-results-api/src/auth.rs
// ============================================================================
// Module: Shared Token Auth
// Description: Token gate applied to every endpoint except health.
// Purpose: Reject unauthenticated requests before any store work begins.
// Dependencies: axum, subtle, url
// ============================================================================

//! ## Overview
//! A single process-wide secret is accepted either as the `authToken` query
//! parameter or as an `Authorization: token <value>` header. Comparison runs
//! in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;
use url::form_urlencoded;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Query parameter carrying the token.
pub const AUTH_TOKEN_PARAM: &str = "authToken";
/// Authorization header scheme.
const TOKEN_SCHEME: &str = "token";
/// Maximum accepted authorization header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Auth Gate
// ============================================================================

/// Shared-token gate.
///
/// # Invariants
/// - The configured token is non-empty.
#[derive(Clone)]
pub struct AuthGate {
    /// Expected token bytes.
    token: Vec<u8>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate").field("token", &"<redacted>").finish()
    }
}

impl AuthGate {
    /// Creates a gate for the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().into_bytes(),
        }
    }

    /// Returns true when the request carries the configured token.
    #[must_use]
    pub fn authorize(&self, query: Option<&str>, headers: &HeaderMap) -> bool {
        if let Some(candidate) = query.and_then(query_token)
            && self.matches(candidate.as_bytes())
        {
            return true;
        }
        header_token(headers).is_some_and(|candidate| self.matches(candidate.as_bytes()))
    }

    /// Compares a candidate token in constant time.
    fn matches(&self, candidate: &[u8]) -> bool {
        !self.token.is_empty() && bool::from(self.token.as_slice().ct_eq(candidate))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the token query parameter.
fn query_token(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == AUTH_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Extracts the token from an `Authorization: token <value>` header.
fn header_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return None;
    }
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case(TOKEN_SCHEME) || token.is_empty() {
        return None;
    }
    Some(token)
}
