// crates/bench-results-core/src/core/time.rs
// ============================================================================
// Module: Bench Results Time Model
// Description: Canonical timestamp representation for run set boundaries.
// Purpose: Keep RFC 3339 on the wire and Unix milliseconds in the store.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Run sets carry start and finish timestamps supplied by uploaders. The wire
//! form is RFC 3339; stores persist UTC Unix milliseconds. Timestamps are
//! truncated to whole milliseconds when constructed, so a parsed value
//! compares equal to the value read back from the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Timestamp recorded on a run set.
///
/// # Invariants
/// - Values are supplied by uploaders; the core never reads wall-clock time.
/// - Values carry at most millisecond precision.
/// - Ordering follows the instant, independent of the UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Wraps an offset date-time, dropping sub-millisecond precision.
    #[must_use]
    pub fn new(value: OffsetDateTime) -> Self {
        // Stays within the same second, so the subtraction cannot overflow.
        let excess = Duration::nanoseconds(i64::from(value.nanosecond() % 1_000_000));
        Self(value - excess)
    }

    /// Returns the wrapped offset date-time.
    #[must_use]
    pub const fn get(self) -> OffsetDateTime {
        self.0
    }

    /// Parses an RFC 3339 timestamp, truncating it to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns a parse error when the input is not RFC 3339.
    pub fn parse(value: &str) -> Result<Self, time::error::Parse> {
        OffsetDateTime::parse(value, &Rfc3339).map(Self::new)
    }

    /// Returns the timestamp as UTC Unix milliseconds, or `None` when out of range.
    #[must_use]
    pub fn as_unix_millis(self) -> Option<i64> {
        i64::try_from(self.0.unix_timestamp_nanos() / 1_000_000).ok()
    }

    /// Creates a UTC timestamp from Unix milliseconds (returns `None` when out of range).
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok().map(Self)
    }

    /// Formats the timestamp as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns a format error when the value cannot be represented in RFC 3339.
    pub fn to_rfc3339(self) -> Result<String, time::error::Format> {
        self.0.format(&Rfc3339)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => fmt::Display::fmt(&self.0, f),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = self.to_rfc3339().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(|err| de::Error::custom(format!("invalid RFC 3339 timestamp: {err}")))
    }
}
