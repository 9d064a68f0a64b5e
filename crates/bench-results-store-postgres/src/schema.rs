// crates/bench-results-store-postgres/src/schema.rs
// ============================================================================
// Module: Postgres Results Schema
// Description: Table layout and serialized schema migration.
// Purpose: Create the results schema once even when instances start together.
// Dependencies: postgres
// ============================================================================

//! ## Overview
//! Migration takes a transaction-scoped advisory lock, so concurrently
//! starting instances create the schema exactly once. The `run_set` and
//! `pull_request` tables reference each other; the run set side of that
//! cycle is added after both tables exist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Client;

use crate::store::PostgresStoreError;
use crate::store::describe_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version written to `store_meta`.
pub const SCHEMA_VERSION: i64 = 1;

/// Advisory lock key guarding migrations.
const MIGRATION_LOCK_KEY: i64 = 0x6265_6e63_6872_7331;

/// Table and index definitions for schema version 1.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS machine (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    architecture TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS config (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    executable TEXT,
    environment_json TEXT NOT NULL,
    options_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS product (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    UNIQUE (name, version)
);
CREATE TABLE IF NOT EXISTS benchmark (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS metric (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    unit TEXT NOT NULL,
    UNIQUE (name, unit)
);
CREATE TABLE IF NOT EXISTS run_set (
    id BIGSERIAL PRIMARY KEY,
    main_product_id BIGINT NOT NULL REFERENCES product (id),
    machine_id BIGINT NOT NULL REFERENCES machine (id),
    config_id BIGINT NOT NULL REFERENCES config (id),
    started_at BIGINT NOT NULL,
    finished_at BIGINT,
    build_url TEXT,
    log_urls_json TEXT NOT NULL,
    timed_out_json TEXT NOT NULL,
    crashed_json TEXT NOT NULL,
    pull_request_id BIGINT
);
CREATE TABLE IF NOT EXISTS pull_request (
    id BIGSERIAL PRIMARY KEY,
    baseline_run_set_id BIGINT NOT NULL REFERENCES run_set (id),
    url TEXT NOT NULL
);
ALTER TABLE run_set ADD CONSTRAINT run_set_pull_request_fk
    FOREIGN KEY (pull_request_id) REFERENCES pull_request (id);
CREATE TABLE IF NOT EXISTS run_set_secondary_product (
    run_set_id BIGINT NOT NULL REFERENCES run_set (id),
    position INTEGER NOT NULL,
    product_id BIGINT NOT NULL REFERENCES product (id),
    PRIMARY KEY (run_set_id, position)
);
CREATE TABLE IF NOT EXISTS run (
    id BIGSERIAL PRIMARY KEY,
    run_set_id BIGINT NOT NULL REFERENCES run_set (id)
);
CREATE TABLE IF NOT EXISTS run_result (
    id BIGSERIAL PRIMARY KEY,
    run_id BIGINT NOT NULL REFERENCES run (id),
    benchmark_id BIGINT NOT NULL REFERENCES benchmark (id),
    metric_id BIGINT NOT NULL REFERENCES metric (id),
    value DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_run_set_machine_config
    ON run_set (machine_id, config_id, started_at);
CREATE INDEX IF NOT EXISTS idx_pull_request_baseline ON pull_request (baseline_run_set_id);
CREATE INDEX IF NOT EXISTS idx_run_run_set ON run (run_set_id);
CREATE INDEX IF NOT EXISTS idx_run_result_run ON run_result (run_id);
";

// ============================================================================
// SECTION: Migration
// ============================================================================

/// Creates the schema on an empty database or validates the stored version.
///
/// # Errors
///
/// Returns [`PostgresStoreError::VersionMismatch`] when the database carries
/// a version this build does not understand.
pub fn migrate(client: &mut Client) -> Result<(), PostgresStoreError> {
    let mut tx = client.transaction().map_err(|err| pg(&err))?;
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])
        .map_err(|err| pg(&err))?;
    tx.batch_execute("CREATE TABLE IF NOT EXISTS store_meta (version BIGINT NOT NULL)")
        .map_err(|err| pg(&err))?;
    let version: Option<i64> = tx
        .query_opt("SELECT version FROM store_meta LIMIT 1", &[])
        .map_err(|err| pg(&err))?
        .map(|row| row.try_get(0))
        .transpose()
        .map_err(|err| pg(&err))?;
    match version {
        None => {
            tx.batch_execute(SCHEMA_V1).map_err(|err| pg(&err))?;
            tx.execute("INSERT INTO store_meta (version) VALUES ($1)", &[&SCHEMA_VERSION])
                .map_err(|err| pg(&err))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(PostgresStoreError::VersionMismatch(format!(
                "unsupported schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit().map_err(|err| pg(&err))
}

/// Maps a client error into a store error.
fn pg(err: &postgres::Error) -> PostgresStoreError {
    PostgresStoreError::Postgres(describe_error(err))
}
