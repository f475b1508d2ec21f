use thiserror::Error;

use crate::data_source::SourceError;
use crate::ProviderId;

/// Validation and contract errors exposed by `coinlens-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid ticker '{value}', expected one of BTC, ETH, SOL")]
    InvalidTicker { value: String },
    #[error("invalid period '{value}', expected one of 1h, 24h, 7d, 30d, 1y, all")]
    InvalidPeriod { value: String },
    #[error("invalid source '{value}', expected one of binance, coingecko")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {millis}ms is out of range")]
    TimestampOutOfRange { millis: i64 },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be greater than zero")]
    NonPositiveValue { field: &'static str },

    #[error("setting '{name}' has invalid value '{value}'")]
    InvalidSetting { name: &'static str, value: String },
}

/// One upstream call that did not contribute to an aggregated result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: ProviderId,
    pub error: SourceError,
}

impl SourceFailure {
    pub fn new(source: ProviderId, error: SourceError) -> Self {
        Self { source, error }
    }
}

/// Request-level failures raised by the aggregator.
///
/// Individual [`SourceError`]s never escape the aggregator on their own; they
/// only surface here, bundled, when nothing usable came back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no data available for '{request}' ({} source failure(s))", failures.len())]
    NoData {
        request: String,
        failures: Vec<SourceFailure>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AggregateError {
    pub fn no_data(request: impl Into<String>, failures: Vec<SourceFailure>) -> Self {
        Self::NoData {
            request: request.into(),
            failures,
        }
    }

    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

/// Failure reported by a durability sink. Never fails a request.
#[derive(Debug, Error)]
#[error("sink append failed: {message}")]
pub struct SinkError {
    message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<coinlens_warehouse::WarehouseError> for SinkError {
    fn from(error: coinlens_warehouse::WarehouseError) -> Self {
        Self::new(error.to_string())
    }
}
