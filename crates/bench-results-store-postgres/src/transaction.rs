// crates/bench-results-store-postgres/src/transaction.rs
// ============================================================================
// Module: Postgres Results Transaction
// Description: StoreTransaction implementation over one pooled client.
// Purpose: Execute every read and write of one request inside one transaction.
// Dependencies: bench-results-core, postgres, r2d2
// ============================================================================

//! ## Overview
//! The transaction is opened with an explicit `BEGIN` on the pooled client so
//! it can own the connection for the request's lifetime. Read-write
//! transactions run `READ COMMITTED, READ WRITE`; read-only transactions run
//! `READ COMMITTED, READ ONLY` and let the server reject writes.

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
use postgres::Row;
use postgres::types::ToSql;
use r2d2::PooledConnection;

use crate::store::PgManager;
use crate::store::describe_error;
use crate::store::store_error;

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

/// Statement parameter list.
type Params<'a> = [&'a (dyn ToSql + Sync)];

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Open Postgres transaction bound to one pooled client.
///
/// # Invariants
/// - `finished` is set only after `COMMIT` or `ROLLBACK` succeeded.
pub struct PostgresTransaction {
    /// Pooled client holding the open transaction.
    client: PooledConnection<PgManager>,
    /// True once the transaction has been committed or rolled back.
    finished: bool,
}

impl PostgresTransaction {
    /// Begins a transaction on a pooled client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the `BEGIN` statement fails.
    pub(crate) fn begin(
        mut client: PooledConnection<PgManager>,
        mode: TransactionMode,
    ) -> Result<Self, StoreError> {
        let statement = match mode {
            TransactionMode::ReadWrite => "BEGIN ISOLATION LEVEL READ COMMITTED, READ WRITE",
            TransactionMode::ReadOnly => "BEGIN ISOLATION LEVEL READ COMMITTED, READ ONLY",
        };
        client.batch_execute(statement).map_err(|err| StoreError::Unavailable(describe_error(&err)))?;
        Ok(Self {
            client,
            finished: false,
        })
    }

    /// Finishes the transaction with `COMMIT` or `ROLLBACK`.
    fn finish(mut self, statement: &str) -> Result<(), StoreError> {
        self.client.batch_execute(statement).map_err(|err| store_error(&err))?;
        self.finished = true;
        Ok(())
    }

    /// Runs a single-row, single-id statement.
    fn query_id(&mut self, sql: &str, params: &Params<'_>) -> Result<Option<i64>, StoreError> {
        self.client
            .query_opt(sql, params)
            .map_err(|err| store_error(&err))?
            .map(|row| row.try_get::<_, i64>(0))
            .transpose()
            .map_err(|err| store_error(&err))
    }

    /// Runs an insert that must return a generated id.
    fn insert_id(
        &mut self,
        sql: &str,
        params: &Params<'_>,
        entity: &str,
    ) -> Result<i64, StoreError> {
        self.query_id(sql, params)?
            .ok_or_else(|| StoreError::Db(format!("{entity} insert returned no id")))
    }

    /// Runs a row-count statement.
    fn execute_count(&mut self, sql: &str, params: &Params<'_>) -> Result<u64, StoreError> {
        self.client.execute(sql, params).map_err(|err| store_error(&err))
    }

    /// Loads the secondary products of a run set in stored order.
    fn secondary_products(&mut self, run_set_id: i64) -> Result<Vec<Product>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT p.name, p.version, p.commit_hash FROM run_set_secondary_product s \
                 JOIN product p ON p.id = s.product_id \
                 WHERE s.run_set_id = $1 ORDER BY s.position",
                &[&run_set_id],
            )
            .map_err(|err| store_error(&err))?;
        rows.iter()
            .map(|row| -> Result<Product, postgres::Error> {
                Ok(Product {
                    name: row.try_get(0)?,
                    version: row.try_get(1)?,
                    commit: row.try_get(2)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| store_error(&err))
    }

    /// Decodes a run set row and attaches its secondary products.
    fn build_run_set(&mut self, row: &Row) -> Result<RunSetListing, StoreError> {
        let id: i64 = get(row, 0)?;
        let secondary_products = self.secondary_products(id)?;
        let pull_request_id: Option<i64> = get(row, 16)?;
        let baseline_run_set_id: Option<i64> = get(row, 17)?;
        let pull_request_url: Option<String> = get(row, 18)?;
        let pull_request = match (pull_request_id, baseline_run_set_id, pull_request_url) {
            (Some(id), Some(baseline), Some(url)) => Some(PullRequest {
                id: PullRequestId::new(id),
                baseline_run_set_id: RunSetId::new(baseline),
                url,
            }),
            _ => None,
        };
        let environment_json: String = get(row, 8)?;
        let options_json: String = get(row, 9)?;
        let log_urls_json: String = get(row, 13)?;
        let timed_out_json: String = get(row, 14)?;
        let crashed_json: String = get(row, 15)?;
        let run_set = RunSet {
            id: RunSetId::new(id),
            main_product: Product {
                name: get(row, 1)?,
                version: get(row, 2)?,
                commit: get(row, 3)?,
            },
            secondary_products,
            machine: Machine {
                name: get(row, 4)?,
                architecture: get(row, 5)?,
            },
            config: Config {
                name: get(row, 6)?,
                executable: get(row, 7)?,
                environment_variables: decode_json(&environment_json, "environment_json")?,
                options: decode_json(&options_json, "options_json")?,
            },
            started_at: decode_timestamp(get(row, 10)?)?,
            finished_at: decode_optional_timestamp(get(row, 11)?)?,
            build_url: get(row, 12)?,
            log_urls: decode_json::<BTreeMap<String, String>>(&log_urls_json, "log_urls_json")?,
            timed_out_benchmarks: decode_json::<BTreeSet<String>>(
                &timed_out_json,
                "timed_out_json",
            )?,
            crashed_benchmarks: decode_json::<BTreeSet<String>>(&crashed_json, "crashed_json")?,
            pull_request,
            runs: Vec::new(),
        };
        Ok(RunSetListing {
            run_set,
            run_count: decode_count(get(row, 19)?, "run count")?,
        })
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.client.batch_execute("ROLLBACK");
        }
    }
}

impl StoreTransaction for PostgresTransaction {
    fn commit(self) -> Result<(), StoreError> {
        self.finish("COMMIT")
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.finish("ROLLBACK")
    }

    fn find_machine(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.query_id("SELECT id FROM machine WHERE name = $1", &[&name])
    }

    fn insert_machine(&mut self, machine: &Machine) -> Result<Option<i64>, StoreError> {
        self.query_id(
            "INSERT INTO machine (name, architecture) VALUES ($1, $2) \
             ON CONFLICT (name) DO NOTHING RETURNING id",
            &[&machine.name, &machine.architecture],
        )
    }

    fn find_config(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.query_id("SELECT id FROM config WHERE name = $1", &[&name])
    }

    fn insert_config(&mut self, config: &Config) -> Result<Option<i64>, StoreError> {
        let environment_json = encode_json(&config.environment_variables, "environment_json")?;
        let options_json = encode_json(&config.options, "options_json")?;
        self.query_id(
            "INSERT INTO config (name, executable, environment_json, options_json) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (name) DO NOTHING RETURNING id",
            &[&config.name, &config.executable, &environment_json, &options_json],
        )
    }

    fn find_product(&mut self, product: &ProductRef) -> Result<Option<StoredProduct>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, commit_hash FROM product WHERE name = $1 AND version = $2",
                &[&product.name, &product.version],
            )
            .map_err(|err| store_error(&err))?;
        row.map(|row| -> Result<StoredProduct, StoreError> {
            Ok(StoredProduct {
                id: get(&row, 0)?,
                commit: get(&row, 1)?,
            })
        })
        .transpose()
    }

    fn insert_product(&mut self, product: &Product) -> Result<Option<i64>, StoreError> {
        self.query_id(
            "INSERT INTO product (name, version, commit_hash) VALUES ($1, $2, $3) \
             ON CONFLICT (name, version) DO NOTHING RETURNING id",
            &[&product.name, &product.version, &product.commit],
        )
    }

    fn find_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.query_id("SELECT id FROM benchmark WHERE name = $1", &[&name])
    }

    fn insert_benchmark(&mut self, name: &str) -> Result<Option<i64>, StoreError> {
        self.query_id(
            "INSERT INTO benchmark (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id",
            &[&name],
        )
    }

    fn find_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError> {
        self.query_id("SELECT id FROM metric WHERE name = $1 AND unit = $2", &[&name, &unit])
    }

    fn insert_metric(&mut self, name: &str, unit: &str) -> Result<Option<i64>, StoreError> {
        self.query_id(
            "INSERT INTO metric (name, unit) VALUES ($1, $2) \
             ON CONFLICT (name, unit) DO NOTHING RETURNING id",
            &[&name, &unit],
        )
    }

    fn list_benchmarks(&mut self) -> Result<Vec<String>, StoreError> {
        let rows = self
            .client
            .query("SELECT name FROM benchmark ORDER BY name", &[])
            .map_err(|err| store_error(&err))?;
        rows.iter().map(|row| get(row, 0)).collect()
    }

    fn run_set_exists(&mut self, id: RunSetId) -> Result<bool, StoreError> {
        Ok(self.query_id("SELECT id FROM run_set WHERE id = $1", &[&id.get()])?.is_some())
    }

    fn insert_pull_request(
        &mut self,
        pull_request: &PullRequestDescriptor,
    ) -> Result<PullRequestId, StoreError> {
        self.insert_id(
            "INSERT INTO pull_request (baseline_run_set_id, url) VALUES ($1, $2) RETURNING id",
            &[&pull_request.baseline_run_set_id.get(), &pull_request.url],
            "pull request",
        )
        .map(PullRequestId::new)
    }

    fn insert_run_set(&mut self, run_set: &NewRunSet<'_>) -> Result<RunSetId, StoreError> {
        let aggregates = run_set.aggregates;
        let started_at = encode_timestamp(aggregates.started_at)?;
        let finished_at = encode_optional_timestamp(aggregates.finished_at)?;
        let log_urls_json = encode_json(&aggregates.log_urls, "log_urls_json")?;
        let timed_out_json = encode_json(&aggregates.timed_out_benchmarks, "timed_out_json")?;
        let crashed_json = encode_json(&aggregates.crashed_benchmarks, "crashed_json")?;
        let pull_request_id = run_set.pull_request_id.map(PullRequestId::get);
        let id = self.insert_id(
            "INSERT INTO run_set (main_product_id, machine_id, config_id, started_at, \
             finished_at, build_url, log_urls_json, timed_out_json, crashed_json, \
             pull_request_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
            &[
                &run_set.main_product_id,
                &run_set.machine_id,
                &run_set.config_id,
                &started_at,
                &finished_at,
                &aggregates.build_url,
                &log_urls_json,
                &timed_out_json,
                &crashed_json,
                &pull_request_id,
            ],
            "run set",
        )?;
        for (position, product_id) in run_set.secondary_product_ids.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Invalid("too many secondary products".to_string()))?;
            self.execute_count(
                "INSERT INTO run_set_secondary_product (run_set_id, position, product_id) \
                 VALUES ($1, $2, $3)",
                &[&id, &position, product_id],
            )?;
        }
        Ok(RunSetId::new(id))
    }

    fn update_run_set(
        &mut self,
        id: RunSetId,
        aggregates: &RunSetAggregates,
    ) -> Result<(), StoreError> {
        let started_at = encode_timestamp(aggregates.started_at)?;
        let finished_at = encode_optional_timestamp(aggregates.finished_at)?;
        let log_urls_json = encode_json(&aggregates.log_urls, "log_urls_json")?;
        let timed_out_json = encode_json(&aggregates.timed_out_benchmarks, "timed_out_json")?;
        let crashed_json = encode_json(&aggregates.crashed_benchmarks, "crashed_json")?;
        let updated = self.execute_count(
            "UPDATE run_set SET started_at = $1, finished_at = $2, build_url = $3, \
             log_urls_json = $4, timed_out_json = $5, crashed_json = $6 WHERE id = $7",
            &[
                &started_at,
                &finished_at,
                &aggregates.build_url,
                &log_urls_json,
                &timed_out_json,
                &crashed_json,
                &id.get(),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Db(format!("run set {id} not found for update")));
        }
        Ok(())
    }

    fn insert_run(&mut self, run_set: RunSetId) -> Result<RunId, StoreError> {
        self.insert_id(
            "INSERT INTO run (run_set_id) VALUES ($1) RETURNING id",
            &[&run_set.get()],
            "run",
        )
        .map(RunId::new)
    }

    fn insert_result(
        &mut self,
        run: RunId,
        benchmark_id: i64,
        metric_id: i64,
        value: f64,
    ) -> Result<(), StoreError> {
        self.execute_count(
            "INSERT INTO run_result (run_id, benchmark_id, metric_id, value) \
             VALUES ($1, $2, $3, $4)",
            &[&run.get(), &benchmark_id, &metric_id, &value],
        )?;
        Ok(())
    }

    fn run_exists(&mut self, run: RunId) -> Result<bool, StoreError> {
        Ok(self.query_id("SELECT id FROM run WHERE id = $1", &[&run.get()])?.is_some())
    }

    fn fetch_run_set(&mut self, id: RunSetId) -> Result<Option<RunSet>, StoreError> {
        let row = self
            .client
            .query_opt(&format!("{RUN_SET_SELECT} WHERE rs.id = $1"), &[&id.get()])
            .map_err(|err| store_error(&err))?;
        match row {
            Some(row) => Ok(Some(self.build_run_set(&row)?.run_set)),
            None => Ok(None),
        }
    }

    fn fetch_runs(&mut self, id: RunSetId) -> Result<Vec<Run>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT r.id, b.name, m.name, m.unit, rr.value FROM run r \
                 LEFT JOIN run_result rr ON rr.run_id = r.id \
                 LEFT JOIN benchmark b ON b.id = rr.benchmark_id \
                 LEFT JOIN metric m ON m.id = rr.metric_id \
                 WHERE r.run_set_id = $1 ORDER BY r.id, rr.id",
                &[&id.get()],
            )
            .map_err(|err| store_error(&err))?;
        let mut runs: Vec<Run> = Vec::new();
        for row in &rows {
            let run_id = RunId::new(get(row, 0)?);
            if runs.last().is_none_or(|run| run.id != run_id) {
                runs.push(Run {
                    id: run_id,
                    results: Vec::new(),
                });
            }
            let benchmark: Option<String> = get(row, 1)?;
            let metric: Option<String> = get(row, 2)?;
            let unit: Option<String> = get(row, 3)?;
            let value: Option<f64> = get(row, 4)?;
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
        let rows = self
            .client
            .query(
                &format!(
                    "{RUN_SET_SELECT} WHERE m.name = $1 AND c.name = $2 \
                     ORDER BY rs.started_at, rs.id"
                ),
                &[&machine, &config],
            )
            .map_err(|err| store_error(&err))?;
        rows.iter().map(|row| self.build_run_set(row)).collect()
    }

    fn count_baseline_references(&mut self, id: RunSetId) -> Result<u64, StoreError> {
        let count = self
            .query_id(
                "SELECT COUNT(*) FROM pull_request WHERE baseline_run_set_id = $1",
                &[&id.get()],
            )?
            .unwrap_or(0);
        decode_count(count, "baseline references")
    }

    fn delete_run_set(&mut self, id: RunSetId) -> Result<DeletedCounts, StoreError> {
        let pull_request_id = self.query_id(
            "SELECT pull_request_id FROM run_set WHERE id = $1 AND pull_request_id IS NOT NULL",
            &[&id.get()],
        )?;
        let deleted_run_metrics = self.execute_count(
            "DELETE FROM run_result WHERE run_id IN (SELECT id FROM run WHERE run_set_id = $1)",
            &[&id.get()],
        )?;
        let deleted_runs =
            self.execute_count("DELETE FROM run WHERE run_set_id = $1", &[&id.get()])?;
        self.execute_count(
            "DELETE FROM run_set_secondary_product WHERE run_set_id = $1",
            &[&id.get()],
        )?;
        self.execute_count("DELETE FROM run_set WHERE id = $1", &[&id.get()])?;
        if let Some(pull_request_id) = pull_request_id {
            self.execute_count("DELETE FROM pull_request WHERE id = $1", &[&pull_request_id])?;
        }
        Ok(DeletedCounts {
            deleted_run_metrics,
            deleted_runs,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a typed column, mapping type mismatches to store errors.
fn get<'a, T: postgres::types::FromSql<'a>>(row: &'a Row, index: usize) -> Result<T, StoreError> {
    row.try_get(index).map_err(|err| StoreError::Invalid(err.to_string()))
}
