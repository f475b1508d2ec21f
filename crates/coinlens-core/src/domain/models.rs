use serde::{Deserialize, Serialize};

use crate::{Period, ProviderId, Ticker, UtcDateTime, ValidationError};

/// A single observed price. Fields are public so analytics can be exercised
/// on raw data; use [`PricePoint::new`] for anything coming off the wire.
/// Deserialization goes through the same price check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPricePoint")]
pub struct PricePoint {
    pub ts: UtcDateTime,
    pub price: f64,
}

impl PricePoint {
    pub fn new(ts: UtcDateTime, price: f64) -> Result<Self, ValidationError> {
        validate_price("price", price)?;
        Ok(Self { ts, price })
    }
}

/// Current-price observation tagged with its instrument and upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceSample")]
pub struct PriceSample {
    pub ticker: Ticker,
    pub source: ProviderId,
    pub price: f64,
    pub ts: UtcDateTime,
}

impl PriceSample {
    pub fn new(
        ticker: Ticker,
        source: ProviderId,
        price: f64,
        ts: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_price("price", price)?;
        Ok(Self {
            ticker,
            source,
            price,
            ts,
        })
    }

    pub fn point(&self) -> PricePoint {
        PricePoint {
            ts: self.ts,
            price: self.price,
        }
    }
}

/// Time-ordered history for one (ticker, source, period). May be empty.
/// Deserialized points are re-sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPriceSeries")]
pub struct PriceSeries {
    pub ticker: Ticker,
    pub source: ProviderId,
    pub period: Period,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Builds a series, sorting points by timestamp ascending.
    pub fn new(
        ticker: Ticker,
        source: ProviderId,
        period: Period,
        mut points: Vec<PricePoint>,
    ) -> Self {
        points.sort_by(|left, right| left.ts.cmp(&right.ts));
        Self {
            ticker,
            source,
            period,
            points,
        }
    }

    pub fn empty(ticker: Ticker, source: ProviderId, period: Period) -> Self {
        Self::new(ticker, source, period, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.price).collect()
    }
}

#[derive(Deserialize)]
struct RawPricePoint {
    ts: UtcDateTime,
    price: f64,
}

impl TryFrom<RawPricePoint> for PricePoint {
    type Error = ValidationError;

    fn try_from(raw: RawPricePoint) -> Result<Self, Self::Error> {
        Self::new(raw.ts, raw.price)
    }
}

#[derive(Deserialize)]
struct RawPriceSample {
    ticker: Ticker,
    source: ProviderId,
    price: f64,
    ts: UtcDateTime,
}

impl TryFrom<RawPriceSample> for PriceSample {
    type Error = ValidationError;

    fn try_from(raw: RawPriceSample) -> Result<Self, Self::Error> {
        Self::new(raw.ticker, raw.source, raw.price, raw.ts)
    }
}

#[derive(Deserialize)]
struct RawPriceSeries {
    ticker: Ticker,
    source: ProviderId,
    period: Period,
    points: Vec<PricePoint>,
}

impl From<RawPriceSeries> for PriceSeries {
    fn from(raw: RawPriceSeries) -> Self {
        Self::new(raw.ticker, raw.source, raw.period, raw.points)
    }
}

fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}
