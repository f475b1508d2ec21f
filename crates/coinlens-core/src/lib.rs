//! # Coinlens Core
//!
//! Multi-source crypto price aggregation with a TTL cache and per-source
//! analytics.
//!
//! ## Overview
//!
//! - **Domain types** for tickers, periods, samples and series
//! - **Data source trait** with Binance and CoinGecko adapters
//! - **Aggregator** that fans out to every source concurrently, keeps
//!   whatever succeeds and memoizes the result
//! - **Statistics** (range, mean, volatility, global and rolling outliers)
//! - **Reports** (multi-source comparison, single-ticker trend, chart overlay)
//! - **Sample sink** writing current prices through to the warehouse
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Binance and CoinGecko adapters |
//! | [`aggregator`] | Fan-out, single-flight and cache orchestration |
//! | [`cache`] | TTL cache keyed by request fingerprint |
//! | [`circuit_breaker`] | Per-adapter circuit breaker |
//! | [`config`] | TTL/timeout policy and adapter settings |
//! | [`data_source`] | Source trait, request kinds, source errors |
//! | [`domain`] | Ticker, Period, PricePoint, PriceSample, PriceSeries |
//! | [`error`] | Validation and aggregate errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`report`] | Comparison, trend and chart reports |
//! | [`sink`] | Durability sink for samples |
//! | [`source`] | Provider identifiers |
//! | [`stats`] | Pure statistics |
//! | [`throttling`] | Client-side rate budgets |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coinlens_core::{Aggregator, Period, Ticker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let aggregator = Aggregator::builder().with_default_sources().build();
//!
//!     let comparison = aggregator.compare(Ticker::Btc, Period::SevenDays).await?;
//!     for (source, stats) in &comparison.data.sources {
//!         println!("{source}: {stats:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Aggregator    │────▶│ CacheStore       │
//! └────────┬────────┘     └──────────────────┘
//!          │ fan-out (JoinSet, per-call timeout)
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Sources    │────▶│ HTTP Client      │
//! │ (adapters)      │     │ + breaker/budget │
//! └─────────────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Stats / Reports │     │ Sample sink      │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Source failures never escape the aggregator on their own:
//!
//! ```rust
//! use coinlens_core::AggregateError;
//!
//! fn exit_code(error: &AggregateError) -> i32 {
//!     match error {
//!         AggregateError::NoData { .. } => 4,
//!         AggregateError::Configuration(_) => 10,
//!     }
//! }
//! ```

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod report;
pub mod sink;
pub mod source;
pub mod stats;
pub mod throttling;

// Adapter implementations
pub use adapters::{BinanceAdapter, CoinGeckoAdapter};

// Aggregation
pub use aggregator::{Aggregated, Aggregator, AggregatorBuilder};

// Caching
pub use cache::{CacheStore, CachedPayload, Fingerprint};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitCall, CircuitState};

// Configuration
pub use config::{AggregatorConfig, SourceSettings};

// Data source trait and types
pub use data_source::{
    CapabilitySet, DataSource, HistoryBatch, RequestKind, SampleBatch, SourceError,
    SourceErrorKind, SourceFuture,
};

// Domain models
pub use domain::{Period, PricePoint, PriceSample, PriceSeries, Ticker, UtcDateTime};

// Error types
pub use error::{AggregateError, SinkError, SourceFailure, ValidationError};

// HTTP client types
pub use http_client::{
    CannedHttpClient, HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Reports
pub use report::{
    build_chart_overlay, build_comparison, build_trend_report, ChartOverlay, ComparisonResult,
    SeriesOverlay, TrendReport,
};

// Sink
pub use sink::SampleSink;

// Warehouse (re-exported from coinlens-warehouse)
pub use coinlens_warehouse::{SampleRecord, Warehouse, WarehouseConfig, WarehouseError};

// Source identifiers
pub use source::ProviderId;

// Statistics
pub use stats::{compute_stats, global_outliers, rolling_outliers, round_to, SourceStats};

// Throttling
pub use throttling::RateBudget;
