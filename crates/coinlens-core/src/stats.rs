//! Pure statistics over a single source's prices.
//!
//! Nothing here rounds; callers round with [`round_to`] when presenting.

use serde::{Deserialize, Serialize};

use crate::PriceSeries;

/// Smallest rolling window, regardless of series length.
pub const MIN_ROLLING_WINDOW: usize = 5;
/// Sigma multiplier for the local (rolling) outlier test.
pub const ROLLING_SIGMA: f64 = 3.0;
/// Sigma multiplier for the whole-series outlier test.
pub const GLOBAL_SIGMA: f64 = 2.0;

/// Range, mean and volatility for one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// `(max - min) / min * 100`, or `0` when `min <= 0`.
    pub volatility_pct: f64,
}

impl SourceStats {
    pub fn rounded(self, places: u32) -> Self {
        Self {
            min: round_to(self.min, places),
            max: round_to(self.max, places),
            mean: round_to(self.mean, places),
            volatility_pct: round_to(self.volatility_pct, places),
        }
    }
}

/// Returns `None` for an empty series.
pub fn compute_stats(series: &PriceSeries) -> Option<SourceStats> {
    stats_of(&series.prices())
}

/// Same as [`compute_stats`] over raw prices.
pub fn stats_of(prices: &[f64]) -> Option<SourceStats> {
    let (min, max) = min_max(prices)?;
    let mean = mean(prices)?;
    Some(SourceStats {
        min,
        max,
        mean,
        volatility_pct: volatility_percent(min, max),
    })
}

pub fn volatility_percent(min: f64, max: f64) -> f64 {
    if min <= 0.0 {
        return 0.0;
    }
    (max - min) / min * 100.0
}

pub fn min_max(prices: &[f64]) -> Option<(f64, f64)> {
    let first = *prices.first()?;
    Some(
        prices
            .iter()
            .skip(1)
            .fold((first, first), |(low, high), &price| {
                (low.min(price), high.max(price))
            }),
    )
}

pub fn mean(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

/// Sample standard deviation (ddof = 1). A single value has a deviation of 0.
pub fn sample_std(prices: &[f64]) -> Option<f64> {
    let mean = mean(prices)?;
    if prices.len() < 2 {
        return Some(0.0);
    }
    let squares: f64 = prices.iter().map(|price| (price - mean).powi(2)).sum();
    Some((squares / (prices.len() - 1) as f64).sqrt())
}

/// `max(5, ceil(len / 10))`.
pub fn rolling_window(len: usize) -> usize {
    len.div_ceil(10).max(MIN_ROLLING_WINDOW)
}

/// Centered moving mean and sample deviation, one value per input price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingBands {
    pub window: usize,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Centered rolling statistics.
///
/// The window for index `i` spans `[i + 1 + off - w, i + 1 + off)` with
/// `off = (w - 1) / 2`. Indices whose window runs off either end take the
/// nearest complete window's values (backward fill, then forward fill).
/// Returns `None` when `window` is zero or longer than the series.
pub fn rolling_bands(prices: &[f64], window: usize) -> Option<RollingBands> {
    if window == 0 || prices.len() < window {
        return None;
    }

    let offset = (window - 1) / 2;
    let mut means = vec![None; prices.len()];
    let mut stds = vec![None; prices.len()];

    for index in 0..prices.len() {
        let end = index + 1 + offset;
        if end > prices.len() || end < window {
            continue;
        }
        let slice = &prices[end - window..end];
        means[index] = mean(slice);
        stds[index] = sample_std(slice);
    }

    Some(RollingBands {
        window,
        mean: fill_edges(means)?,
        std: fill_edges(stds)?,
    })
}

fn fill_edges(values: Vec<Option<f64>>) -> Option<Vec<f64>> {
    let mut filled = values;

    let mut next = None;
    for slot in filled.iter_mut().rev() {
        match slot {
            Some(value) => next = Some(*value),
            None => *slot = next,
        }
    }

    let mut previous = None;
    for slot in filled.iter_mut() {
        match slot {
            Some(value) => previous = Some(*value),
            None => *slot = previous,
        }
    }

    filled.into_iter().collect()
}

/// Indices where `|p - mean_i| > 3 * std_i` over the centered rolling window.
///
/// Series shorter than the window have no outliers.
pub fn rolling_outliers(prices: &[f64]) -> Vec<usize> {
    let Some(bands) = rolling_bands(prices, rolling_window(prices.len())) else {
        return Vec::new();
    };

    prices
        .iter()
        .enumerate()
        .filter(|(index, price)| {
            (*price - bands.mean[*index]).abs() > ROLLING_SIGMA * bands.std[*index]
        })
        .map(|(index, _)| index)
        .collect()
}

/// Indices where `|p - mean| > 2 * std` over the whole series.
pub fn global_outliers(prices: &[f64]) -> Vec<usize> {
    let (Some(mean), Some(std)) = (mean(prices), sample_std(prices)) else {
        return Vec::new();
    };

    prices
        .iter()
        .enumerate()
        .filter(|(_, price)| (*price - mean).abs() > GLOBAL_SIGMA * std)
        .map(|(index, _)| index)
        .collect()
}

/// Half-away-from-zero rounding to `places` decimals.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}
