// crates/bench-results-core/src/core/codec.rs
// ============================================================================
// Module: Bench Results Column Codec
// Description: Shared encoding of structured columns for relational stores.
// Purpose: Keep sqlite and postgres backends on one column representation.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Maps, ordered lists, and benchmark sets are persisted as JSON text columns;
//! timestamps are persisted as UTC Unix milliseconds. Decoding treats stored
//! values as untrusted and fails closed with [`StoreError::Invalid`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::time::Timestamp;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: JSON Columns
// ============================================================================

/// Encodes a structured value as a JSON text column.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when serialization fails.
pub fn encode_json<T: Serialize>(value: &T, column: &str) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::Invalid(format!("failed to encode {column}: {err}")))
}

/// Decodes a JSON text column.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the stored text is not valid for `T`.
pub fn decode_json<T: DeserializeOwned>(text: &str, column: &str) -> Result<T, StoreError> {
    serde_json::from_str(text)
        .map_err(|err| StoreError::Invalid(format!("failed to decode {column}: {err}")))
}

// ============================================================================
// SECTION: Timestamp Columns
// ============================================================================

/// Encodes a timestamp as UTC Unix milliseconds.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the timestamp is outside the i64 range.
pub fn encode_timestamp(value: Timestamp) -> Result<i64, StoreError> {
    value
        .as_unix_millis()
        .ok_or_else(|| StoreError::Invalid(format!("timestamp out of range: {value}")))
}

/// Decodes UTC Unix milliseconds into a timestamp.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the stored value is out of range.
pub fn decode_timestamp(millis: i64) -> Result<Timestamp, StoreError> {
    Timestamp::from_unix_millis(millis)
        .ok_or_else(|| StoreError::Invalid(format!("stored timestamp out of range: {millis}")))
}

/// Encodes an optional timestamp.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the timestamp is outside the i64 range.
pub fn encode_optional_timestamp(value: Option<Timestamp>) -> Result<Option<i64>, StoreError> {
    value.map(encode_timestamp).transpose()
}

/// Decodes an optional timestamp column.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the stored value is out of range.
pub fn decode_optional_timestamp(millis: Option<i64>) -> Result<Option<Timestamp>, StoreError> {
    millis.map(decode_timestamp).transpose()
}

/// Converts a store row count into `u64`.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the count is negative.
pub fn decode_count(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Invalid(format!("negative {column}: {value}")))
}
