//! Trend report over samples stored by earlier `price` runs. Never calls an
//! upstream.

use std::time::Instant;

use coinlens_core::sink::stored_samples;
use coinlens_core::{build_trend_report, Period, SinkError, Ticker, UtcDateTime, Warehouse};

use crate::cli::ReportArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &ReportArgs) -> Result<CommandResult, CliError> {
    let ticker = args.ticker.parse::<Ticker>()?;
    let period = args.period.parse::<Period>()?;
    let started = Instant::now();

    let samples = tokio::task::spawn_blocking(move || {
        let warehouse = Warehouse::open_default().map_err(SinkError::from)?;
        stored_samples(&warehouse, ticker, period, UtcDateTime::now())
    })
    .await
    .map_err(|error| CliError::Command(format!("report task failed: {error}")))??;

    let report = build_trend_report(ticker, period, &samples).ok_or_else(|| {
        CliError::NoStoredSamples {
            ticker: ticker.to_string(),
            period: period.to_string(),
        }
    })?;

    let latency_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
    Ok(CommandResult::offline(serde_json::to_value(report)?).with_latency(latency_ms))
}
