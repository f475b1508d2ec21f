//! # Coinlens Warehouse
//!
//! DuckDB-backed durability sink for price samples.
//!
//! The aggregator appends every successful current-price sample here, and
//! the offline trend report reads them back. Nothing in the request path
//! ever reads from the warehouse.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coinlens_warehouse::{SampleRecord, Warehouse};
//!
//! fn main() -> Result<(), coinlens_warehouse::WarehouseError> {
//!     let warehouse = Warehouse::open_default()?;
//!     warehouse.ingest_samples(
//!         "req-001",
//!         &[SampleRecord {
//!             ticker: String::from("BTC"),
//!             source: String::from("binance"),
//!             price: 64_000.0,
//!             ts_ms: 1_704_067_200_000,
//!         }],
//!     )?;
//!
//!     let history = warehouse.load_samples("BTC", None)?;
//!     println!("{} stored samples", history.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `price_samples` | Every stored observation (ticker, source, price, time) |
//! | `ingest_log` | One row per source per ingest call |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
mod error;
pub mod migrations;
mod models;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use ::duckdb::ToSql;

pub use duckdb::{AccessMode, ConnectionPool, PooledConnection};
pub use error::WarehouseError;
pub use models::{IngestReport, SampleRecord};

/// Location and pool sizing of the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for coinlens data (`COINLENS_HOME`, default `~/.coinlens`).
    pub coinlens_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::in_home(resolve_coinlens_home())
    }
}

impl WarehouseConfig {
    pub fn in_home(coinlens_home: impl Into<PathBuf>) -> Self {
        let coinlens_home = coinlens_home.into();
        let db_path = coinlens_home.join("warehouse.duckdb");
        Self {
            coinlens_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Handle to the sample warehouse. Cheap to clone.
#[derive(Clone)]
pub struct Warehouse {
    pool: ConnectionPool,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Opens (creating if needed) the database and applies migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { pool };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Appends samples in one transaction and logs one `ingest_log` row per
    /// (ticker, source). Rows with a non-finite or non-positive price are
    /// skipped.
    ///
    /// All values are bound as parameters.
    pub fn ingest_samples(
        &self,
        request_id: &str,
        rows: &[SampleRecord],
    ) -> Result<IngestReport, WarehouseError> {
        let (valid, invalid): (Vec<&SampleRecord>, Vec<&SampleRecord>) = rows
            .iter()
            .partition(|row| row.price.is_finite() && row.price > 0.0);
        if valid.is_empty() {
            return Ok(IngestReport {
                inserted: 0,
                skipped: invalid.len(),
            });
        }

        let connection = self.pool.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let mut per_source: BTreeMap<(&str, &str), i64> = BTreeMap::new();
            for row in &valid {
                let params: [&dyn ToSql; 5] =
                    [&row.ticker, &row.source, &row.price, &row.ts_ms, &row.ts_ms];
                connection.execute(
                    "INSERT INTO price_samples (ticker, source, price, ts_ms, ts) \
                     VALUES (?, ?, ?, ?, epoch_ms(?))",
                    params.as_slice(),
                )?;
                *per_source
                    .entry((row.ticker.as_str(), row.source.as_str()))
                    .or_default() += 1;
            }

            for ((ticker, source), count) in per_source {
                let params: [&dyn ToSql; 4] = [&request_id, &ticker, &source, &count];
                connection.execute(
                    "INSERT INTO ingest_log (request_id, ticker, source, row_count, timestamp) \
                     VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)?;
        Ok(IngestReport {
            inserted: valid.len(),
            skipped: invalid.len(),
        })
    }

    /// Stored samples for `ticker`, oldest first, optionally only those at or
    /// after `since_ms`.
    pub fn load_samples(
        &self,
        ticker: &str,
        since_ms: Option<i64>,
    ) -> Result<Vec<SampleRecord>, WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadOnly)?;
        let map_row = |row: &::duckdb::Row<'_>| -> ::duckdb::Result<SampleRecord> {
            Ok(SampleRecord {
                ticker: row.get(0)?,
                source: row.get(1)?,
                price: row.get(2)?,
                ts_ms: row.get(3)?,
            })
        };

        let records = match since_ms {
            Some(since_ms) => {
                let mut statement = connection.prepare(
                    "SELECT ticker, source, price, ts_ms FROM price_samples \
                     WHERE ticker = ? AND ts_ms >= ? ORDER BY ts_ms, source",
                )?;
                let params: [&dyn ToSql; 2] = [&ticker, &since_ms];
                let rows = statement.query_map(params.as_slice(), map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut statement = connection.prepare(
                    "SELECT ticker, source, price, ts_ms FROM price_samples \
                     WHERE ticker = ? ORDER BY ts_ms, source",
                )?;
                let params: [&dyn ToSql; 1] = [&ticker];
                let rows = statement.query_map(params.as_slice(), map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(records)
    }

    /// Number of `ingest_log` rows, for diagnostics.
    pub fn ingest_count(&self) -> Result<i64, WarehouseError> {
        let connection = self.pool.acquire(AccessMode::ReadOnly)?;
        let count = connection.query_row("SELECT COUNT(*) FROM ingest_log", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn finalize_transaction<T>(
    connection: &::duckdb::Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_coinlens_home() -> PathBuf {
    if let Some(path) = env::var_os("COINLENS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".coinlens");
    }

    PathBuf::from(".coinlens")
}
