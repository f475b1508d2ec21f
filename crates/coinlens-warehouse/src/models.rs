use serde::{Deserialize, Serialize};

/// One persisted price observation.
///
/// Identifiers are stored as their canonical lowercase/uppercase text
/// (`binance`, `BTC`) so the warehouse stays independent of core types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub ticker: String,
    pub source: String,
    pub price: f64,
    /// Observation time in unix milliseconds.
    pub ts_ms: i64,
}

/// Outcome of one [`crate::Warehouse::ingest_samples`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub skipped: usize,
}
