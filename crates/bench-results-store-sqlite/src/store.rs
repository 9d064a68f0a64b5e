// crates/bench-results-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Results Store
// Description: Configuration, connection pool, and transaction source.
// Purpose: Hand out one SQLite transaction per request from a bounded pool.
// Dependencies: bench-results-core, r2d2, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteStore`] validates its path, creates or migrates the schema once at
//! open, and then serves transactions from an `r2d2` pool. Every pooled
//! connection carries the same pragmas (foreign keys, journal mode, sync
//! mode, busy timeout). Connections left inside a transaction are treated as
//! broken and discarded by the pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use bench_results_core::StoreError;
use bench_results_core::TransactionMode;
use bench_results_core::TransactionSource;
use r2d2::ManageConnection;
use r2d2::Pool;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use thiserror::Error;

use crate::schema::initialize_schema;
use crate::transaction::SqliteTransaction;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (milliseconds).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 8;
/// Default pool checkout timeout (milliseconds).
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum length of the full store path.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for the pool size.
const MAX_POOL_CONNECTIONS: u32 = 256;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` results store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `max_connections` is in `1..=256`.
/// - Timeouts are interpreted as milliseconds and must be non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Pool checkout timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a configuration with defaults for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
        }
    }

    /// Validates pool limits and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is out of range.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.max_connections == 0 || self.max_connections > MAX_POOL_CONNECTIONS {
            return Err(SqliteStoreError::Invalid(format!(
                "max_connections out of range: {} (max {MAX_POOL_CONNECTIONS})",
                self.max_connections
            )));
        }
        if self.connection_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "connection_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default pool size.
const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

/// Returns the default pool checkout timeout.
const fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding stored row payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Connection pool could not provide a connection.
    #[error("sqlite store pool error: {0}")]
    Pool(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Pool(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

/// Maps a rusqlite error into a store error.
pub(crate) fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// `r2d2` connection manager opening configured `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteConnectionManager {
    /// Store configuration applied to every connection.
    config: SqliteStoreConfig,
}

impl ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = SqliteStoreError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        open_connection(&self.config)
    }

    fn is_valid(&self, connection: &mut Self::Connection) -> Result<(), Self::Error> {
        connection.execute_batch("SELECT 1;").map_err(|err| db_error(&err))
    }

    fn has_broken(&self, connection: &mut Self::Connection) -> bool {
        !connection.is_autocommit()
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed transaction source.
///
/// # Invariants
/// - The schema is created or validated before the pool hands out connections.
/// - At most `max_connections` connections are open at any time.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Bounded connection pool.
    pool: Pool<SqliteConnectionManager>,
    /// Database file path.
    path: PathBuf,
}

impl SqliteStore {
    /// Opens the store, creating or migrating the schema as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the schema
    /// version is unsupported, or the pool cannot be built.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        drop(connection);

        let path = config.path.clone();
        let max_connections = config.max_connections;
        let connection_timeout = Duration::from_millis(config.connection_timeout_ms);
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(connection_timeout)
            .build(SqliteConnectionManager {
                config,
            })
            .map_err(|err| SqliteStoreError::Pool(err.to_string()))?;
        Ok(Self {
            pool,
            path,
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of open and idle pooled connections.
    #[must_use]
    pub fn pool_state(&self) -> (u32, u32) {
        let state = self.pool.state();
        (state.connections, state.idle_connections)
    }
}

impl TransactionSource for SqliteStore {
    type Transaction = SqliteTransaction;

    fn begin(&self, mode: TransactionMode) -> Result<Self::Transaction, StoreError> {
        let connection =
            self.pool.get().map_err(|err| StoreError::Unavailable(err.to_string()))?;
        SqliteTransaction::begin(connection, mode)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for integrity and durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}
