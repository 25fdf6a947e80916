//! # ratiolens-warehouse
//!
//! DuckDB-backed persistence for ratio snapshots, health scores, quotes and
//! daily bars.
//!
//! Every value coming from a provider or a user is bound as a query
//! parameter; the only interpolated SQL is the fixed schema.
//!
//! ```rust,no_run
//! use ratiolens_warehouse::{QueryGuardrails, Warehouse};
//!
//! let warehouse = Warehouse::open_default()?;
//! let result = warehouse.execute_query(
//!     "SELECT symbol, metric, value FROM v_latest_ratios WHERE symbol = 'TD'",
//!     QueryGuardrails::default(),
//!     false,
//! )?;
//! println!("{} rows", result.row_count);
//! # Ok::<(), ratiolens_warehouse::WarehouseError>(())
//! ```
//!
//! ## Tables
//!
//! | Table | Contents |
//! |-------|----------|
//! | `ratio_snapshots` | one row per assembled ratio set, full JSON payload |
//! | `ratio_values` | populated metrics of each snapshot with provenance |
//! | `health_scores` | subscores, total and grade per snapshot |
//! | `quotes` | point-in-time quotes |
//! | `bars_1d` | daily OHLCV bars |
//! | `ingest_log` | ingestion audit trail |

pub mod duckdb;
mod error;
pub mod migrations;
mod query;
mod records;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};
pub use error::WarehouseError;
pub use query::{QueryGuardrails, QueryResult, SqlColumn};
pub use records::{
    BarRecord, HealthScoreRecord, QuoteRecord, RatioSnapshotRecord, RatioValueRecord,
    StoredSnapshot,
};

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for ratiolens data.
    pub ratiolens_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::at(resolve_ratiolens_home())
    }
}

impl WarehouseConfig {
    /// Lays out the database under `home`.
    pub fn at(home: impl Into<PathBuf>) -> Self {
        let ratiolens_home = home.into();
        let db_path = ratiolens_home.join("warehouse.duckdb");
        Self {
            ratiolens_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Applies pending migrations and refreshes views. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Runs user SQL. Only a single SELECT-like statement is accepted, and it
    /// runs on a read-only connection.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = query::normalize_sql(sql)?;
        query::enforce_read_only(sql)?;

        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        query::execute(&connection, sql, guardrails)
    }

    /// Stores one ratio snapshot with its flattened values in a single transaction.
    pub fn ingest_ratio_snapshot(
        &self,
        request_id: &str,
        record: &RatioSnapshotRecord,
        latency_ms: u64,
    ) -> Result<(), WarehouseError> {
        if record.symbol.trim().is_empty() {
            return Err(WarehouseError::InvalidRecord(String::from(
                "snapshot symbol must not be empty",
            )));
        }

        self.in_transaction(|connection| {
            let params: [&dyn ToSql; 5] = [
                &record.snapshot_id,
                &record.symbol,
                &record.provider,
                &record.fetched_unix,
                &record.payload,
            ];
            connection.execute(
                "INSERT OR REPLACE INTO ratio_snapshots \
                 (snapshot_id, symbol, provider, fetched_unix, payload, updated_at) \
                 VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;

            for value in record.values.iter().filter(|value| value.value.is_finite()) {
                let params: [&dyn ToSql; 6] = [
                    &record.snapshot_id,
                    &record.symbol,
                    &value.category,
                    &value.metric,
                    &value.value,
                    &value.source,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO ratio_values \
                     (snapshot_id, symbol, category, metric, value, source) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }

            let source = record.provider.as_deref().unwrap_or("none");
            log_ingest(
                connection,
                request_id,
                &record.symbol,
                source,
                "ratios",
                latency_ms,
            )
        })
    }

    pub fn ingest_health_score(
        &self,
        request_id: &str,
        record: &HealthScoreRecord,
    ) -> Result<(), WarehouseError> {
        record.validate()?;

        self.in_transaction(|connection| {
            let params: [&dyn ToSql; 10] = [
                &record.snapshot_id,
                &record.symbol,
                &record.profitability,
                &record.liquidity,
                &record.leverage,
                &record.valuation,
                &record.efficiency,
                &record.total,
                &record.grade,
                &record.scored_unix,
            ];
            connection.execute(
                "INSERT OR REPLACE INTO health_scores \
                 (snapshot_id, symbol, profitability, liquidity, leverage, valuation, efficiency, \
                  total, grade, scored_unix) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;
            log_ingest(connection, request_id, &record.symbol, "engine", "health", 0)
        })
    }

    pub fn ingest_quotes(
        &self,
        request_id: &str,
        rows: &[QuoteRecord],
        latency_ms: u64,
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }
        for row in rows {
            row.validate()?;
        }

        self.in_transaction(|connection| {
            for row in rows {
                let volume = row.volume.and_then(|volume| i64::try_from(volume).ok());
                let params: [&dyn ToSql; 9] = [
                    &row.symbol,
                    &row.price,
                    &row.change,
                    &row.change_percent,
                    &volume,
                    &row.market_cap,
                    &row.source,
                    &row.as_of,
                    &row.as_of_unix,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO quotes \
                     (symbol, price, change, change_percent, volume, market_cap, source, as_of, as_of_unix) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
                log_ingest(
                    connection,
                    request_id,
                    &row.symbol,
                    &row.source,
                    "quote",
                    latency_ms,
                )?;
            }
            Ok(())
        })
    }

    pub fn ingest_bars(
        &self,
        source: &str,
        request_id: &str,
        rows: &[BarRecord],
        latency_ms: u64,
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        self.in_transaction(|connection| {
            for row in rows {
                let volume = row.volume.and_then(|volume| i64::try_from(volume).ok());
                let params: [&dyn ToSql; 8] = [
                    &row.symbol,
                    &row.ts,
                    &row.open,
                    &row.high,
                    &row.low,
                    &row.close,
                    &volume,
                    &source,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO bars_1d \
                     (symbol, ts, open, high, low, close, volume, source, updated_at) \
                     VALUES (?, TRY_CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            let symbol = rows.first().map_or("", |row| row.symbol.as_str());
            log_ingest(connection, request_id, symbol, source, "bars_1d", latency_ms)
        })
    }

    /// Most recent snapshot for `symbol` fetched at or after `not_before_unix`.
    pub fn latest_snapshot(
        &self,
        symbol: &str,
        not_before_unix: i64,
    ) -> Result<Option<StoredSnapshot>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT snapshot_id, symbol, provider, fetched_unix, payload \
             FROM ratio_snapshots \
             WHERE symbol = ? AND fetched_unix >= ? \
             ORDER BY fetched_unix DESC \
             LIMIT 1",
        )?;
        let params: [&dyn ToSql; 2] = [&symbol, &not_before_unix];
        let mut rows = statement.query(params.as_slice())?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(StoredSnapshot {
            snapshot_id: row.get(0)?,
            symbol: row.get(1)?,
            provider: row.get(2)?,
            fetched_unix: row.get(3)?,
            payload: row.get(4)?,
        }))
    }

    /// Quotes for `symbol` stamped at or after `not_before_unix`, newest first.
    pub fn quote_history(
        &self,
        symbol: &str,
        not_before_unix: i64,
    ) -> Result<Vec<QuoteRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT symbol, price, change, change_percent, volume, market_cap, source, as_of, as_of_unix \
             FROM quotes \
             WHERE symbol = ? AND as_of_unix >= ? \
             ORDER BY as_of_unix DESC",
        )?;
        let params: [&dyn ToSql; 2] = [&symbol, &not_before_unix];
        let mut rows = statement.query(params.as_slice())?;

        let mut quotes = Vec::new();
        while let Some(row) = rows.next()? {
            let volume: Option<i64> = row.get(4)?;
            quotes.push(QuoteRecord {
                symbol: row.get(0)?,
                price: row.get(1)?,
                change: row.get(2)?,
                change_percent: row.get(3)?,
                volume: volume.and_then(|volume| u64::try_from(volume).ok()),
                market_cap: row.get(5)?,
                source: row.get(6)?,
                as_of: row.get(7)?,
                as_of_unix: row.get(8)?,
            });
        }
        Ok(quotes)
    }

    fn in_transaction<F>(&self, work: F) -> Result<(), WarehouseError>
    where
        F: FnOnce(&Connection) -> Result<(), WarehouseError>,
    {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        match work(&connection) {
            Ok(()) => {
                connection.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(error) => {
                let _ = connection.execute_batch("ROLLBACK");
                Err(error)
            }
        }
    }
}

fn log_ingest(
    connection: &Connection,
    request_id: &str,
    symbol: &str,
    source: &str,
    dataset: &str,
    latency_ms: u64,
) -> Result<(), WarehouseError> {
    let latency_ms = i64::try_from(latency_ms).unwrap_or(i64::MAX);
    let params: [&dyn ToSql; 5] = [&request_id, &symbol, &source, &dataset, &latency_ms];
    connection.execute(
        "INSERT INTO ingest_log \
         (request_id, symbol, source, dataset, status, latency_ms, timestamp) \
         VALUES (?, ?, ?, ?, 'ok', ?, CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    Ok(())
}

fn resolve_ratiolens_home() -> PathBuf {
    if let Some(path) = env::var_os("RATIOLENS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".ratiolens");
    }

    PathBuf::from(".ratiolens")
}
