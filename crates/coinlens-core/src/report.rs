//! Report shapes built from per-source series.
//!
//! | Builder | Input | Outlier test |
//! |---------|-------|--------------|
//! | [`build_comparison`] | one series per source | none |
//! | [`build_trend_report`] | stored samples of one ticker | global 2σ |
//! | [`build_chart_overlay`] | one series per source | rolling 3σ |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stats::{self, RollingBands, SourceStats};
use crate::{Period, PricePoint, PriceSample, PriceSeries, ProviderId, Ticker, UtcDateTime};

/// Decimal places used when presenting prices and percentages.
pub const PRICE_PLACES: u32 = 2;
/// Decimal places used for the trend report spread.
pub const SPREAD_PLACES: u32 = 4;

/// Per-source stats for one ticker and period. A source that answered with
/// an empty series maps to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub ticker: Ticker,
    pub period: Period,
    pub generated_at: UtcDateTime,
    pub sources: BTreeMap<ProviderId, Option<SourceStats>>,
}

pub fn build_comparison(
    ticker: Ticker,
    period: Period,
    series: &BTreeMap<ProviderId, PriceSeries>,
) -> ComparisonResult {
    let sources = series
        .iter()
        .map(|(source, series)| {
            let stats = stats::compute_stats(series).map(|stats| stats.rounded(PRICE_PLACES));
            (*source, stats)
        })
        .collect();

    ComparisonResult {
        ticker,
        period,
        generated_at: UtcDateTime::now(),
        sources,
    }
}

/// Single-ticker summary over stored samples, all sources pooled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub ticker: Ticker,
    pub period: Period,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub spread_percentage: f64,
    pub outliers_count: usize,
    pub sample_count: usize,
    /// Time of the newest sample.
    pub timestamp: UtcDateTime,
}

/// Returns `None` when `samples` is empty. Samples need not be sorted.
pub fn build_trend_report(
    ticker: Ticker,
    period: Period,
    samples: &[PriceSample],
) -> Option<TrendReport> {
    let mut ordered: Vec<&PriceSample> = samples.iter().collect();
    ordered.sort_by_key(|sample| sample.ts);

    let prices: Vec<f64> = ordered.iter().map(|sample| sample.price).collect();
    let summary = stats::stats_of(&prices)?;
    let timestamp = ordered.last()?.ts;

    Some(TrendReport {
        ticker,
        period,
        min_price: stats::round_to(summary.min, PRICE_PLACES),
        max_price: stats::round_to(summary.max, PRICE_PLACES),
        avg_price: stats::round_to(summary.mean, PRICE_PLACES),
        spread_percentage: stats::round_to(summary.volatility_pct, SPREAD_PLACES),
        outliers_count: stats::global_outliers(&prices).len(),
        sample_count: prices.len(),
        timestamp,
    })
}

/// Numeric content of one source's chart layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesOverlay {
    pub source: ProviderId,
    pub points: Vec<PricePoint>,
    /// Centered rolling mean, aligned with `points`. Empty when the series is
    /// shorter than the window.
    pub trend: Vec<f64>,
    pub window: usize,
    pub anomalies: Vec<PricePoint>,
    pub low: PricePoint,
    pub high: PricePoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOverlay {
    pub ticker: Ticker,
    pub period: Period,
    pub layers: Vec<SeriesOverlay>,
}

/// Empty series contribute no layer.
pub fn build_chart_overlay(
    ticker: Ticker,
    period: Period,
    series: &BTreeMap<ProviderId, PriceSeries>,
) -> ChartOverlay {
    let layers = series
        .iter()
        .filter_map(|(source, series)| series_overlay(*source, series))
        .collect();

    ChartOverlay {
        ticker,
        period,
        layers,
    }
}

fn series_overlay(source: ProviderId, series: &PriceSeries) -> Option<SeriesOverlay> {
    let prices = series.prices();
    let window = stats::rolling_window(prices.len());
    let trend = stats::rolling_bands(&prices, window)
        .map(|RollingBands { mean, .. }| mean)
        .unwrap_or_default();
    let anomalies = stats::rolling_outliers(&prices)
        .into_iter()
        .map(|index| series.points[index])
        .collect();

    // First occurrence wins on ties.
    let low = series
        .points
        .iter()
        .copied()
        .reduce(|best, point| if point.price < best.price { point } else { best })?;
    let high = series
        .points
        .iter()
        .copied()
        .reduce(|best, point| if point.price > best.price { point } else { best })?;

    Some(SeriesOverlay {
        source,
        points: series.points.clone(),
        trend,
        window,
        anomalies,
        low,
        high,
    })
}
