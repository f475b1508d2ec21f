use coinlens_core::{AggregateError, SinkError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("no stored samples for {ticker} over {period}; run 'coinlens price {ticker}' first")]
    NoStoredSamples { ticker: String, period: String },

    #[error("warehouse error: {0}")]
    Warehouse(#[from] SinkError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Aggregate(AggregateError::NoData { .. }) | Self::NoStoredSamples { .. } => 4,
            Self::Aggregate(AggregateError::Configuration(_))
            | Self::Warehouse(_)
            | Self::Command(_)
            | Self::Serialization(_) => 10,
        }
    }
}
