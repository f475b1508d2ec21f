//! # Domain Models
//!
//! Canonical domain types for coinlens price data.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Supported instrument (BTC, ETH, SOL) |
//! | [`Period`] | Lookback window (1h, 24h, 7d, 30d, 1y, all) |
//! | [`PricePoint`] | Timestamped price |
//! | [`PriceSample`] | Current price tagged with ticker and source |
//! | [`PriceSeries`] | Ordered history for one ticker/source/period |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Prices are validated at construction: they must be finite and strictly
//! positive.

mod models;
mod period;
mod ticker;
mod timestamp;

pub use models::{PricePoint, PriceSample, PriceSeries};
pub use period::Period;
pub use ticker::Ticker;
pub use timestamp::UtcDateTime;
