//! Durability sink for fetched samples.

use coinlens_warehouse::{SampleRecord, Warehouse};
use tracing::debug;
use uuid::Uuid;

use crate::error::SinkError;
use crate::{Period, PriceSample, ProviderId, Ticker, UtcDateTime};

/// Append-only destination for current-price samples.
///
/// Called from a blocking task that nobody awaits; an `Err` is logged and
/// otherwise ignored.
pub trait SampleSink: Send + Sync {
    fn append(&self, samples: &[PriceSample]) -> Result<(), SinkError>;
}

impl SampleSink for Warehouse {
    fn append(&self, samples: &[PriceSample]) -> Result<(), SinkError> {
        let rows: Vec<SampleRecord> = samples.iter().map(sample_record).collect();
        let request_id = Uuid::new_v4().to_string();
        let report = self.ingest_samples(&request_id, &rows)?;
        debug!(
            request_id = %request_id,
            inserted = report.inserted,
            skipped = report.skipped,
            "samples appended to warehouse"
        );
        Ok(())
    }
}

pub fn sample_record(sample: &PriceSample) -> SampleRecord {
    SampleRecord {
        ticker: sample.ticker.as_str().to_owned(),
        source: sample.source.as_str().to_owned(),
        price: sample.price,
        ts_ms: sample.ts.unix_millis(),
    }
}

/// Stored samples of `ticker` within `period` of `now`, oldest first.
///
/// Rows that no longer validate (unknown source, bad price) are skipped.
pub fn stored_samples(
    warehouse: &Warehouse,
    ticker: Ticker,
    period: Period,
    now: UtcDateTime,
) -> Result<Vec<PriceSample>, SinkError> {
    let since_ms = period
        .lookback()
        .map(|lookback| now.saturating_sub(lookback).unix_millis());
    let records = warehouse.load_samples(ticker.as_str(), since_ms)?;

    Ok(records
        .iter()
        .filter_map(|record| {
            let sample = price_sample(ticker, record);
            if sample.is_none() {
                debug!(source = %record.source, ts_ms = record.ts_ms, "skipping unusable stored sample");
            }
            sample
        })
        .collect())
}

fn price_sample(ticker: Ticker, record: &SampleRecord) -> Option<PriceSample> {
    let source = record.source.parse::<ProviderId>().ok()?;
    let ts = UtcDateTime::from_unix_millis(record.ts_ms).ok()?;
    PriceSample::new(ticker, source, record.price, ts).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinlens_warehouse::WarehouseConfig;

    #[test]
    fn warehouse_sink_persists_samples() {
        let temp = tempfile::tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::in_home(temp.path())).expect("warehouse open");
        let ts = UtcDateTime::from_unix_millis(1_704_067_200_000).expect("valid millis");

        warehouse
            .append(&[
                PriceSample::new(Ticker::Btc, ProviderId::Binance, 64_000.0, ts).expect("valid"),
                PriceSample::new(Ticker::Btc, ProviderId::Coingecko, 64_010.0, ts).expect("valid"),
            ])
            .expect("append");

        let stored = warehouse.load_samples("BTC", None).expect("load");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].source, "binance");
        assert_eq!(stored[0].ts_ms, 1_704_067_200_000);
    }

    #[test]
    fn stored_samples_respect_the_period_lookback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::in_home(temp.path())).expect("warehouse open");
        let now = UtcDateTime::parse("2024-01-02T00:00:00Z").expect("valid");
        let hour_ago = now.unix_millis() - 3_600_000;

        warehouse
            .ingest_samples(
                "req-1",
                &[
                    SampleRecord {
                        ticker: String::from("ETH"),
                        source: String::from("binance"),
                        price: 3_000.0,
                        ts_ms: hour_ago - 1,
                    },
                    SampleRecord {
                        ticker: String::from("ETH"),
                        source: String::from("coingecko"),
                        price: 3_010.0,
                        ts_ms: hour_ago + 1,
                    },
                    SampleRecord {
                        ticker: String::from("ETH"),
                        source: String::from("kraken"),
                        price: 3_020.0,
                        ts_ms: hour_ago + 2,
                    },
                ],
            )
            .expect("ingest");

        let last_hour =
            stored_samples(&warehouse, Ticker::Eth, Period::OneHour, now).expect("load");
        assert_eq!(last_hour.len(), 1);
        assert_eq!(last_hour[0].source, ProviderId::Coingecko);

        let all = stored_samples(&warehouse, Ticker::Eth, Period::All, now).expect("load");
        assert_eq!(all.len(), 2);
    }
}
