//! Data source trait and request/error types.
//!
//! This module defines the upstream adapter contract (`DataSource`) that every
//! price provider implements, plus the structured [`SourceError`] the
//! aggregator catches and logs.
//!
//! # Request kinds
//!
//! | Kind | Method | Response | Description |
//! |------|--------|----------|-------------|
//! | Current | [`DataSource::fetch_current`] | [`PriceSample`] | Latest spot price |
//! | History | [`DataSource::fetch_history`] | [`PriceSeries`] | Price history over a [`Period`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use coinlens_core::{BinanceAdapter, DataSource, Ticker};
//!
//! async fn spot(adapter: &BinanceAdapter) -> Result<f64, coinlens_core::SourceError> {
//!     let sample = adapter.fetch_current(Ticker::Btc).await?;
//!     Ok(sample.price)
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Period, PriceSample, PriceSeries, ProviderId, Ticker};

/// Request kind used for fingerprints, TTL policy, and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Current,
    History,
}

impl RequestKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::History => "history",
        }
    }
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported request matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub current: bool,
    pub history: bool,
}

impl CapabilitySet {
    pub const fn new(current: bool, history: bool) -> Self {
        Self { current, history }
    }

    pub const fn full() -> Self {
        Self::new(true, true)
    }

    pub const fn supports(self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::Current => self.current,
            RequestKind::History => self.history,
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    UnsupportedRequest,
    Unavailable,
    Timeout,
    RateLimited,
    InvalidRequest,
    NoData,
    Malformed,
    Internal,
}

/// Structured error for one failed upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unsupported_request(kind: RequestKind) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedRequest,
            message: format!("request kind '{kind}' is not supported by this source"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(budget: Duration) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: format!("source call exceeded {}ms budget", budget.as_millis()),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NoData,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Malformed,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::UnsupportedRequest => "source.unsupported_request",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NoData => "source.no_data",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Current prices gathered from every source that answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub ticker: Ticker,
    pub samples: Vec<PriceSample>,
}

/// Per-source history for one ticker and period.
///
/// A source that answered with no points keeps an empty series here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBatch {
    pub ticker: Ticker,
    pub period: Period,
    pub series: BTreeMap<ProviderId, PriceSeries>,
}

impl HistoryBatch {
    pub fn has_points(&self) -> bool {
        self.series.values().any(|series| !series.is_empty())
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Upstream adapter contract.
///
/// Each call is independently fallible. Timeouts are enforced by the caller,
/// so implementations may simply await their transport.
///
/// # Empty history
///
/// An `Ok` series with no points means "the source answered, but had nothing
/// for this window". Adapters must keep that distinct from a [`SourceError`]
/// consistently, since the aggregator cannot recover a distinction the
/// adapter collapses.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across tasks.
pub trait DataSource: Send + Sync {
    /// Returns the unique provider identifier.
    fn id(&self) -> ProviderId;

    /// Returns the set of supported request kinds.
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    /// Fetches the latest price for `ticker`.
    fn fetch_current<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, PriceSample>;

    /// Fetches price history for `ticker` over `period`.
    fn fetch_history<'a>(&'a self, ticker: Ticker, period: Period)
        -> SourceFuture<'a, PriceSeries>;
}
