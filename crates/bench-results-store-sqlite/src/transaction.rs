// crates/bench-results-store-sqlite/src/transaction.rs
// ============================================================================
// Module: SQLite Results Transaction
// Description: StoreTransaction implementation over one pooled connection.
// Purpose: Execute every read and write of one request inside one transaction.
// Dependencies: bench-results-core, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! A [`SqliteTransaction`] owns a pooled connection with an open
//! `BEGIN IMMEDIATE` (read-write) or `BEGIN DEFERRED` (read-only)
//! transaction. Conflict-tolerant inserts use
//! `INSERT .. ON CONFLICT DO NOTHING RETURNING id`, so a concurrent creator of
//! the same natural key yields `Ok(None)` instead of an error. Dropping the
//! transaction without committing rolls it back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use bench_results_core::Config;
use bench_results_core::DeletedCounts;
use bench_results_core::Machine;
use bench_results_core::NewRunSet;
use bench_results_core::Product;
use bench_results_core::ProductRef;
use bench_results_core::PullRequest;
use bench_results_core::PullRequestDescriptor;
use bench_results_core::PullRequestId;
use bench_results_core::Run;
use bench_results_core::RunId;
use bench_results_core::RunResult;
use bench_results_core::RunSet;
use bench_results_core::RunSetAggregates;
use bench_results_core::RunSetId;
use bench_results_core::RunSetListing;
use bench_results_core::StoreError;
use bench_results_core::StoreTransaction;
use bench_results_core::StoredProduct;
use bench_results_core::TransactionMode;
use bench_results_core::codec::decode_count;
use bench_results_core::codec::decode_json;
use bench_results_core::codec::decode_optional_timestamp;
use bench_results_core::codec::decode_timestamp;
use bench_results_core::codec::encode_json;
use bench_results_core::codec::encode_optional_timestamp;
use bench_results_core::codec::encode_timestamp;
use r2d2::PooledConnection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::store::SqliteConnectionManager;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Shared projection for run set reads.
const RUN_SET_SELECT: &str = "SELECT rs.id, p.name, p.version, p.commit_hash, m.name, \
     m.architecture, c.name, c.executable, c.environment_json, c.options_json, rs.started_at, \
     rs.finished_at, rs.build_url, rs.log_urls_json, rs.timed_out_json, rs.crashed_json, pr.id, \
     pr.baseline_run_set_id, pr.url, (SELECT COUNT(*) FROM run r WHERE r.run_set_id = rs.id) \
     FROM run_set rs \
     JOIN product p ON p.id = rs.main_product_id \
     JOIN machine m ON m.id = rs.machine_id \
     JOIN config c ON c.id = rs.config_id \
     LEFT JOIN pull_request pr ON pr.id = rs.pull_request_id";

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Open `SQLite` transaction bound to one pooled connection.
///
/// # Invariants
/// - `finished` is set only after `COMMIT` or `ROLLBACK` succeeded.
/// - Read-only transactions reject every write before touching the database.
pub struct SqliteTransaction {
    /// Pooled connection holding the open transaction.
    connection: PooledConnection<SqliteConnectionManager>,
    /// Locking intent the transaction was opened with.
    mode: TransactionMode,
    /// True once the transaction has been committed or rolled back.
    finished: bool,
}

impl SqliteTransaction {
    /// Begins a transaction on a pooled connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the `BEGIN` statement fails,
    /// for example because the database is locked past the busy timeout.
    pub(crate) fn begin(
        connection: PooledConnection<SqliteConnectionManager>,
        mode: TransactionMode,
    ) -> Result<Self, StoreError> {
        let statement = match mode {
            TransactionMode::ReadWrite => "BEGIN IMMEDIATE",
            TransactionMode::ReadOnly => "BEGIN DEFERRED",
        };
        connection
            .execute_batch(statement)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self {
            connection,
            mode,
            finished: false,
        })
    }

    /// Rejects writes inside read-only transactions.
    fn ensure_writable(&self) -> Result<(), StoreError> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => {
                Err(StoreError::Db("cannot write in a read-only transaction".to_string()))
            }
        }
    }

    /// Finishes the transaction with `COMMIT` or `ROLLBACK`.
    fn finish(mut self, statement: &str) -> Result<(), StoreError> {
        self.connection.execute_batch(statement).map_err(|err| db(&err))?;
        self.finished = true;
        Ok(())
    }

    /// Loads the secondary products of a run set in stored order.
    fn secondary_products(&self, run_set_id: i64) -> Result<Vec<Product>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached(
                "SELECT p.name, p.version, p.commit_hash FROM run_set_secondary_product s \
                 JOIN product p ON p.id = s.product_id \
                 WHERE s.run_set_id = ?1 ORDER BY s.position",
            )
            .map_err(|err| db(&err))?;
        let rows = statement
            .query_map(params![run_set_id], |row| {
                Ok(Product {
                    name: row.get(0)?,
                    version: row.get(1)?,
                    commit: row.get(2)?,
                })
            })
            .map_err(|err| db(&err))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| db(&err))
    }

    /// Decodes a raw run set row and attaches its secondary products.
    fn build_run_set(&self, raw: RawRunSet) -> Result<RunSetListing, StoreError> {
        let secondary_products = self.secondary_products(raw.id)?;
        let pull_request = match (raw.pull_request_id, raw.baseline_run_set_id, raw.pull_request_url)
        {
            (Some(id), Some(baseline), Some(url)) => Some(PullRequest {
                id: PullRequestId::new(id),
                baseline_run_set_id: RunSetId::new(baseline),
                url,
            }),
            _ => None,
        };
        let run_set = RunSet {
            id: RunSetId::new(raw.id),
            main_product: raw.main_product,
            secondary_products,
            machine: raw.machine,
            config: Config {
                name: raw.config_name,
                executable: raw.config_executable,
                environment_variables: decode_json(&raw.environment_json, "environment_json")?,
                options: decode_json(&raw.options_json, "options_json")?,
            },
            started_at: decode_timestamp(raw.started_at)?,
            finished_at: decode_optional_timestamp(raw.finished_at)?,
            build_url: raw.build_url,
            log_urls: decode_json::<BTreeMap<String, String>>(&raw.log_urls_json, "log_urls_json")?,
            timed_out_benchmarks: decode_json::<BTreeSet<String>>(
                &raw.timed_out_json,
                "timed_out_json",
            )?,
            crashed_benchmarks: decode_json::<BTreeSet<String>>(&raw.crashed_json, "crashed_json")?,
            pull_request,
            runs: Vec::new(),
        };
        Ok(RunSetListing {
            run_set,
            run_count: decode_count(raw.run_count, "run count")?,
        })
    }

    /// Runs a conflict-tolerant insert returning the new row id.
    fn insert_returning<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Option<i64>, StoreError> {
        self.ensure_writable()?;
        self.connection
            .prepare_cached(sql)
            .and_then(|mut statement| statement.query_row(params, |row| row.get(0)).optional())
            .map_err(|err| db(&err))
    }

    /// Runs a single-value lookup.
    fn lookup_id<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Option<i64>, StoreError> {
        self.connection
            .prepare_cached(sql)
            .and_then(|mut statement| statement.query_row(params, |row| row.get(0)).optional())
            .map_err(|err| db(&err))
    }

    /// Runs a row-count statement.
    fn execute_count<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<u64, StoreError> {
        let affected = self.connection.execute(sql, params).map_err(|err| db(&err))?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
    }
}

impl StoreTransaction for SqliteTransaction {
    fn commit(self) -> Result<(), StoreError> {
        self.finish("COMMIT")
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.finish("ROLLBACK")
    }

    fn find_machine(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.lookup_id("SELECT id FROM machine WHERE name = ?1", params![name])
    }

    fn insert_machine(&mut self, machine: &Machine) -> Result<Option<i64>, StoreError> {
        self.insert_returning(
            "INSERT INTO machine (name, architecture) VALUES (?1, ?2) \
             ON CONFLICT (name) DO NOTHING RETURNING id",
            params![machine.name, machine.architecture],
        )
    }

    fn find_config(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.lookup_id("SELECT id FROM config WHERE name = ?1", params![name])
    }

    fn insert_config(&mut self, config: &Config) -> Result<Option<i64>, StoreError> {
        let environment_json = encode_json(&config.environment_variables, "environment_json")?;
        let options_json = encode_json(&config.options, "options_json")?;
        self.insert_returning(
            "INSERT INTO config (name, executable, environment_json, options_json) \
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT (name) DO NOTHING RETURNING id",
            params![config.name, config.executable, environment_json, options_json],
        )
    }

    fn find_product(&mut self, product: &ProductRef) -> Result<Option<StoredProduct>, StoreError> {
        self.connection
            .prepare_cached("SELECT id, commit_hash FROM product WHERE name = ?1 AND version = ?2")
            .and_then(|mut statement| {
                statement
                    .query_row(params![product.name, product.version], |row| {
                        Ok(StoredProduct {
                            id: row.get(0)?,
                            commit: row.get(1)?,
                        })
                    })
                    .optional()
            })
            .map_err(|err| db(&err))
    }

    fn insert_product(&mut self, product: &Product) -> Result<Option<i64>, StoreError> {
        self.insert_returning(
            "INSERT INTO product (name, version, commit_hash) VALUES (?1, ?2, ?3) \
             ON CONFLICT (name, version) DO NOTHING RETURNING id",
            params![product.name, product.version, product.commit],
        )
    }

    fn find_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.lookup_id("SELECT id FROM benchmark WHERE name = ?1", params![name])
    }

    fn insert_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.insert_returning(
            "INSERT INTO benchmark (name) VALUES (?1) ON CONFLICT (name) DO NOTHING RETURNING id",
            params![name],
        )
    }

    fn find_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError> {
        self.lookup_id("SELECT id FROM metric WHERE name = ?1 AND unit = ?2", params![name, unit])
    }

    fn insert_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError> {
        self.insert_returning(
            "INSERT INTO metric (name, unit) VALUES (?1, ?2) \
             ON CONFLICT (name, unit) DO NOTHING RETURNING id",
            params![name, unit],
        )
    }

    fn list_benchmarks(&mut self) -> Result<Vec<String>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached("SELECT name FROM benchmark ORDER BY name")
            .map_err(|err| db(&err))?;
        let rows = statement.query_map(params![], |row| row.get(0)).map_err(|err| db(&err))?;
        rows.collect::<Result<Vec<String>, _>>().map_err(|err| db(&err))
    }

    fn run_set_exists(&mut self, id: RunSetId) -> Result<bool, StoreError> {
        Ok(self.lookup_id("SELECT id FROM run_set WHERE id = ?1", params![id.get()])?.is_some())
    }

    fn insert_pull_request(
        &mut self,
        pull_request: &PullRequestDescriptor,
    ) -> Result<PullRequestId, StoreError> {
        let id = self.insert_returning(
            "INSERT INTO pull_request (baseline_run_set_id, url) VALUES (?1, ?2) RETURNING id",
            params![pull_request.baseline_run_set_id.get(), pull_request.url],
        )?;
        id.map(PullRequestId::new)
            .ok_or_else(|| StoreError::Db("pull request insert returned no id".to_string()))
    }

    fn insert_run_set(&mut self, run_set: &NewRunSet<'_>) -> Result<RunSetId, StoreError> {
        let aggregates = run_set.aggregates;
        let id = self
            .insert_returning(
                "INSERT INTO run_set (main_product_id, machine_id, config_id, started_at, \
                 finished_at, build_url, log_urls_json, timed_out_json, crashed_json, \
                 pull_request_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) RETURNING id",
                params![
                    run_set.main_product_id,
                    run_set.machine_id,
                    run_set.config_id,
                    encode_timestamp(aggregates.started_at)?,
                    encode_optional_timestamp(aggregates.finished_at)?,
                    aggregates.build_url,
                    encode_json(&aggregates.log_urls, "log_urls_json")?,
                    encode_json(&aggregates.timed_out_benchmarks, "timed_out_json")?,
                    encode_json(&aggregates.crashed_benchmarks, "crashed_json")?,
                    run_set.pull_request_id.map(PullRequestId::get),
                ],
            )?
            .ok_or_else(|| StoreError::Db("run set insert returned no id".to_string()))?;
        for (position, product_id) in run_set.secondary_product_ids.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StoreError::Invalid("too many secondary products".to_string()))?;
            self.connection
                .execute(
                    "INSERT INTO run_set_secondary_product (run_set_id, position, product_id) \
                     VALUES (?1, ?2, ?3)",
                    params![id, position, product_id],
                )
                .map_err(|err| db(&err))?;
        }
        Ok(RunSetId::new(id))
    }

    fn update_run_set(
        &mut self,
        id: RunSetId,
        aggregates: &RunSetAggregates,
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let updated = self.execute_count(
            "UPDATE run_set SET started_at = ?1, finished_at = ?2, build_url = ?3, \
             log_urls_json = ?4, timed_out_json = ?5, crashed_json = ?6 WHERE id = ?7",
            params![
                encode_timestamp(aggregates.started_at)?,
                encode_optional_timestamp(aggregates.finished_at)?,
                aggregates.build_url,
                encode_json(&aggregates.log_urls, "log_urls_json")?,
                encode_json(&aggregates.timed_out_benchmarks, "timed_out_json")?,
                encode_json(&aggregates.crashed_benchmarks, "crashed_json")?,
                id.get(),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Db(format!("run set {id} not found for update")));
        }
        Ok(())
    }

    fn insert_run(&mut self, run_set: RunSetId) -> Result<RunId, StoreError> {
        self.insert_returning(
            "INSERT INTO run (run_set_id) VALUES (?1) RETURNING id",
            params![run_set.get()],
        )?
        .map(RunId::new)
        .ok_or_else(|| StoreError::Db("run insert returned no id".to_string()))
    }

    fn insert_result(
        &mut self,
        run: RunId,
        benchmark_id: i64,
        metric_id: i64,
        value: f64,
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.execute_count(
            "INSERT INTO run_result (run_id, benchmark_id, metric_id, value) \
             VALUES (?1, ?2, ?3, ?4)",
            params![run.get(), benchmark_id, metric_id, value],
        )?;
        Ok(())
    }

    fn run_exists(&mut self, run: RunId) -> Result<bool, StoreError> {
        Ok(self.lookup_id("SELECT id FROM run WHERE id = ?1", params![run.get()])?.is_some())
    }

    fn fetch_run_set(&mut self, id: RunSetId) -> Result<Option<RunSet>, StoreError> {
        let raw = self
            .connection
            .prepare_cached(&format!("{RUN_SET_SELECT} WHERE rs.id = ?1"))
            .and_then(|mut statement| {
                statement.query_row(params![id.get()], RawRunSet::from_row).optional()
            })
            .map_err(|err| db(&err))?;
        match raw {
            Some(raw) => Ok(Some(self.build_run_set(raw)?.run_set)),
            None => Ok(None),
        }
    }

    fn fetch_runs(&mut self, id: RunSetId) -> Result<Vec<Run>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached(
                "SELECT r.id, b.name, m.name, m.unit, rr.value FROM run r \
                 LEFT JOIN run_result rr ON rr.run_id = r.id \
                 LEFT JOIN benchmark b ON b.id = rr.benchmark_id \
                 LEFT JOIN metric m ON m.id = rr.metric_id \
                 WHERE r.run_set_id = ?1 ORDER BY r.id, rr.id",
            )
            .map_err(|err| db(&err))?;
        let rows = statement
            .query_map(params![id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })
            .map_err(|err| db(&err))?;
        let mut runs: Vec<Run> = Vec::new();
        for row in rows {
            let (run_id, benchmark, metric, unit, value) = row.map_err(|err| db(&err))?;
            let run_id = RunId::new(run_id);
            if runs.last().is_none_or(|run| run.id != run_id) {
                runs.push(Run {
                    id: run_id,
                    results: Vec::new(),
                });
            }
            if let (Some(benchmark), Some(metric), Some(unit), Some(value), Some(run)) =
                (benchmark, metric, unit, value, runs.last_mut())
            {
                run.results.push(RunResult {
                    benchmark,
                    metric,
                    unit,
                    value,
                });
            }
        }
        Ok(runs)
    }

    fn list_run_sets(
        &mut self,
        machine: &str,
        config: &str,
    ) -> Result<Vec<RunSetListing>, StoreError> {
        let raws = {
            let mut statement = self
                .connection
                .prepare_cached(&format!(
                    "{RUN_SET_SELECT} WHERE m.name = ?1 AND c.name = ?2 \
                     ORDER BY rs.started_at, rs.id"
                ))
                .map_err(|err| db(&err))?;
            let rows = statement
                .query_map(params![machine, config], RawRunSet::from_row)
                .map_err(|err| db(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| db(&err))?
        };
        raws.into_iter().map(|raw| self.build_run_set(raw)).collect()
    }

    fn count_baseline_references(&mut self, id: RunSetId) -> Result<u64, StoreError> {
        let count = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM pull_request WHERE baseline_run_set_id = ?1",
                params![id.get()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| db(&err))?;
        decode_count(count, "baseline references")
    }

    fn delete_run_set(&mut self, id: RunSetId) -> Result<DeletedCounts, StoreError> {
        self.ensure_writable()?;
        let pull_request_id = self.lookup_id(
            "SELECT pull_request_id FROM run_set WHERE id = ?1 AND pull_request_id IS NOT NULL",
            params![id.get()],
        )?;
        let deleted_run_metrics = self.execute_count(
            "DELETE FROM run_result WHERE run_id IN (SELECT id FROM run WHERE run_set_id = ?1)",
            params![id.get()],
        )?;
        let deleted_runs =
            self.execute_count("DELETE FROM run WHERE run_set_id = ?1", params![id.get()])?;
        self.execute_count(
            "DELETE FROM run_set_secondary_product WHERE run_set_id = ?1",
            params![id.get()],
        )?;
        self.execute_count("DELETE FROM run_set WHERE id = ?1", params![id.get()])?;
        if let Some(pull_request_id) = pull_request_id {
            self.execute_count("DELETE FROM pull_request WHERE id = ?1", params![pull_request_id])?;
        }
        Ok(DeletedCounts {
            deleted_run_metrics,
            deleted_runs,
        })
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Run set row as read from the database, before JSON decoding.
struct RawRunSet {
    /// Run set id.
    id: i64,
    /// Main product.
    main_product: Product,
    /// Machine.
    machine: Machine,
    /// Config name.
    config_name: String,
    /// Config executable.
    config_executable: Option<String>,
    /// Config environment JSON.
    environment_json: String,
    /// Config options JSON.
    options_json: String,
    /// Start time in Unix milliseconds.
    started_at: i64,
    /// Finish time in Unix milliseconds.
    finished_at: Option<i64>,
    /// Build URL.
    build_url: Option<String>,
    /// Log URLs JSON.
    log_urls_json: String,
    /// Timed-out benchmarks JSON.
    timed_out_json: String,
    /// Crashed benchmarks JSON.
    crashed_json: String,
    /// Pull request id.
    pull_request_id: Option<i64>,
    /// Pull request baseline.
    baseline_run_set_id: Option<i64>,
    /// Pull request URL.
    pull_request_url: Option<String>,
    /// Number of runs.
    run_count: i64,
}

impl RawRunSet {
    /// Reads the [`RUN_SET_SELECT`] projection.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            main_product: Product {
                name: row.get(1)?,
                version: row.get(2)?,
                commit: row.get(3)?,
            },
            machine: Machine {
                name: row.get(4)?,
                architecture: row.get(5)?,
            },
            config_name: row.get(6)?,
            config_executable: row.get(7)?,
            environment_json: row.get(8)?,
            options_json: row.get(9)?,
            started_at: row.get(10)?,
            finished_at: row.get(11)?,
            build_url: row.get(12)?,
            log_urls_json: row.get(13)?,
            timed_out_json: row.get(14)?,
            crashed_json: row.get(15)?,
            pull_request_id: row.get(16)?,
            baseline_run_set_id: row.get(17)?,
            pull_request_url: row.get(18)?,
            run_count: row.get(19)?,
        })
    }
}

/// Maps a rusqlite error into a store error.
fn db(err: &rusqlite::Error) -> StoreError {
    StoreError::Db(err.to_string())
}
