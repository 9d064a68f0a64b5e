// crates/bench-results-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Results Schema
// Description: Table layout and schema version bookkeeping.
// Purpose: Create the results schema once and refuse unknown versions.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! The schema mirrors the relational results layout: referenced entities
//! (machine, config, product, benchmark, metric) carry unique natural keys so
//! concurrent creators converge on one row. Run sets reference their main
//! product, machine, and config; secondary products live in an ordered link
//! table. Structured columns hold JSON text, timestamps hold UTC Unix
//! milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;

use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version written to `store_meta`.
pub const SCHEMA_VERSION: i64 = 1;

/// Table and index definitions for schema version 1.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS machine (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    architecture TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS config (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    executable TEXT,
    environment_json TEXT NOT NULL,
    options_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS product (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    UNIQUE (name, version)
);
CREATE TABLE IF NOT EXISTS benchmark (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS metric (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    unit TEXT NOT NULL,
    UNIQUE (name, unit)
);
CREATE TABLE IF NOT EXISTS run_set (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    main_product_id INTEGER NOT NULL REFERENCES product (id),
    machine_id INTEGER NOT NULL REFERENCES machine (id),
    config_id INTEGER NOT NULL REFERENCES config (id),
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    build_url TEXT,
    log_urls_json TEXT NOT NULL,
    timed_out_json TEXT NOT NULL,
    crashed_json TEXT NOT NULL,
    pull_request_id INTEGER REFERENCES pull_request (id)
);
CREATE TABLE IF NOT EXISTS pull_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    baseline_run_set_id INTEGER NOT NULL REFERENCES run_set (id),
    url TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS run_set_secondary_product (
    run_set_id INTEGER NOT NULL REFERENCES run_set (id),
    position INTEGER NOT NULL,
    product_id INTEGER NOT NULL REFERENCES product (id),
    PRIMARY KEY (run_set_id, position)
);
CREATE TABLE IF NOT EXISTS run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_set_id INTEGER NOT NULL REFERENCES run_set (id)
);
CREATE TABLE IF NOT EXISTS run_result (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES run (id),
    benchmark_id INTEGER NOT NULL REFERENCES benchmark (id),
    metric_id INTEGER NOT NULL REFERENCES metric (id),
    value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_run_set_machine_config
    ON run_set (machine_id, config_id, started_at);
CREATE INDEX IF NOT EXISTS idx_pull_request_baseline
    ON pull_request (baseline_run_set_id);
CREATE INDEX IF NOT EXISTS idx_run_run_set ON run (run_set_id);
CREATE INDEX IF NOT EXISTS idx_run_result_run ON run_result (run_id);
";

// ============================================================================
// SECTION: Schema Setup
// ============================================================================

/// Creates the schema on an empty database or validates the stored version.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] when the database carries a
/// version this build does not understand.
pub fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| db_error(&err))?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL)",
        params![],
    )
    .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute_batch(SCHEMA_V1).map_err(|err| db_error(&err))?;
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))
}
