// crates/bench-results-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Results Store
// Description: Configuration, connection pool, and transaction source.
// Purpose: Hand out one Postgres transaction per request from a bounded pool.
// Dependencies: bench-results-core, postgres, r2d2, r2d2_postgres, serde
// ============================================================================

//! ## Overview
//! The store parses the connection string, applies connect and statement
//! timeouts, builds the pool, and migrates the schema before returning.
//! Dropping the store releases the pool on a separate thread because the
//! synchronous client must not be torn down inside an async executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use bench_results_core::StoreError;
use bench_results_core::TransactionMode;
use bench_results_core::TransactionSource;
use postgres::NoTls;
use postgres::error::SqlState;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use serde::Deserialize;
use thiserror::Error;

use crate::schema::migrate;
use crate::transaction::PostgresTransaction;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 16;
/// Default connect and pool checkout timeout (milliseconds).
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5_000;
/// Default statement timeout (milliseconds).
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;
/// Upper bound for the pool size.
const MAX_POOL_CONNECTIONS: u32 = 256;

/// Pooled Postgres client type.
pub(crate) type PgManager = PostgresConnectionManager<NoTls>;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Postgres store configuration.
///
/// # Invariants
/// - `connection` is a libpq-style URL or key/value string.
/// - `max_connections` is in `1..=256`; timeouts are non-zero milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresStoreConfig {
    /// Postgres connection string.
    pub connection: String,
    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connect and pool checkout timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Per-statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl PostgresStoreConfig {
    /// Builds a configuration with defaults for the given connection string.
    #[must_use]
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }

    /// Validates pool limits and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError::Invalid`] when a limit is out of range.
    pub fn validate(&self) -> Result<(), PostgresStoreError> {
        if self.connection.trim().is_empty() {
            return Err(PostgresStoreError::Invalid(
                "connection string must not be empty".to_string(),
            ));
        }
        if self.max_connections == 0 || self.max_connections > MAX_POOL_CONNECTIONS {
            return Err(PostgresStoreError::Invalid(format!(
                "max_connections out of range: {} (max {MAX_POOL_CONNECTIONS})",
                self.max_connections
            )));
        }
        if self.connection_timeout_ms == 0 || self.statement_timeout_ms == 0 {
            return Err(PostgresStoreError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default pool size.
const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

/// Returns the default connect timeout.
const fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

/// Returns the default statement timeout.
const fn default_statement_timeout_ms() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres store errors.
#[derive(Debug, Error, Clone)]
pub enum PostgresStoreError {
    /// Postgres error.
    #[error("postgres store error: {0}")]
    Postgres(String),
    /// Connection pool could not provide a connection.
    #[error("postgres store pool error: {0}")]
    Pool(String),
    /// Store schema version mismatch.
    #[error("postgres store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid configuration or data.
    #[error("postgres store invalid data: {0}")]
    Invalid(String),
}

impl From<PostgresStoreError> for StoreError {
    fn from(error: PostgresStoreError) -> Self {
        match error {
            PostgresStoreError::Pool(message) => Self::Unavailable(message),
            PostgresStoreError::Postgres(message) => Self::Db(message),
            PostgresStoreError::VersionMismatch(message)
            | PostgresStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a client error into a store error.
///
/// Closed connections, statement timeouts, and lock conflicts are reported as
/// unavailable so callers may retry.
pub(crate) fn store_error(err: &postgres::Error) -> StoreError {
    if err.is_closed() {
        return StoreError::Unavailable(describe_error(err));
    }
    let retryable = [
        SqlState::QUERY_CANCELED,
        SqlState::T_R_SERIALIZATION_FAILURE,
        SqlState::T_R_DEADLOCK_DETECTED,
        SqlState::LOCK_NOT_AVAILABLE,
    ];
    match err.code() {
        Some(code) if retryable.contains(code) => StoreError::Unavailable(describe_error(err)),
        _ => StoreError::Db(describe_error(err)),
    }
}

/// Renders a client error with the server's SQLSTATE and message when present.
///
/// The client's own `Display` only says `db error` for server-reported failures.
#[must_use]
pub fn describe_error(err: &postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => {
            let mut text = format!("{} {}: {}", db.severity(), db.code().code(), db.message());
            if let Some(detail) = db.detail() {
                text.push_str("; ");
                text.push_str(detail);
            }
            text
        }
        None => err.to_string(),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Postgres-backed transaction source.
///
/// # Invariants
/// - The schema is migrated before the store is returned to callers.
/// - `pool` is `Some` until the store is dropped.
pub struct PostgresStore {
    /// Connection pool for Postgres access.
    pool: Option<Pool<PgManager>>,
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let _ = std::thread::spawn(move || drop(pool));
        }
    }
}

impl PostgresStore {
    /// Connects, builds the pool, and migrates the schema.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError`] when the configuration is invalid, the
    /// database is unreachable, or the schema version is unsupported.
    pub fn open(config: &PostgresStoreConfig) -> Result<Self, PostgresStoreError> {
        config.validate()?;
        let mut pg_config = config
            .connection
            .parse::<postgres::Config>()
            .map_err(|err| PostgresStoreError::Invalid(err.to_string()))?;
        pg_config.connect_timeout(Duration::from_millis(config.connection_timeout_ms));
        let options = format!("-c statement_timeout={}", config.statement_timeout_ms);
        pg_config.options(&options);
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|err| PostgresStoreError::Pool(err.to_string()))?;
        let mut client = pool.get().map_err(|err| PostgresStoreError::Pool(err.to_string()))?;
        migrate(&mut client)?;
        drop(client);
        Ok(Self {
            pool: Some(pool),
        })
    }

    /// Returns the pool or an error when the store is shutting down.
    fn pool(&self) -> Result<&Pool<PgManager>, StoreError> {
        self.pool.as_ref().ok_or_else(|| StoreError::Unavailable("postgres store closed".to_string()))
    }
}

impl TransactionSource for PostgresStore {
    type Transaction = PostgresTransaction;

    fn begin(&self, mode: TransactionMode) -> Result<Self::Transaction, StoreError> {
        let client = self.pool()?.get().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        PostgresTransaction::begin(client, mode)
    }
}
