use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::fetch_body;
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{DataSource, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{Period, PricePoint, PriceSample, PriceSeries, ProviderId, Ticker, UtcDateTime};

pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Binance spot market adapter (`/api/v3/ticker/price`, `/api/v3/klines`).
///
/// History uses kline close prices. An empty kline array is a valid, empty
/// series; a non-array payload is malformed.
pub struct BinanceAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    timeout_ms: u64,
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl BinanceAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(BINANCE_BASE_URL),
            circuit_breaker: Arc::new(CircuitBreaker::with_defaults(ProviderId::Binance)),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn get(&self, url: String) -> Result<String, SourceError> {
        let request = HttpRequest::get(url).with_timeout_ms(self.timeout_ms);
        fetch_body(
            ProviderId::Binance,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            request,
        )
        .await
    }
}

impl DataSource for BinanceAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Binance
    }

    fn fetch_current<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, PriceSample> {
        Box::pin(async move {
            let url = format!(
                "{}/api/v3/ticker/price?symbol={}",
                self.base_url,
                urlencoding::encode(&market_symbol(ticker))
            );
            let body = self.get(url).await?;
            parse_ticker_price(ticker, &body)
        })
    }

    fn fetch_history<'a>(
        &'a self,
        ticker: Ticker,
        period: Period,
    ) -> SourceFuture<'a, PriceSeries> {
        Box::pin(async move {
            let (interval, limit) = kline_plan(period);
            let url = format!(
                "{}/api/v3/klines?symbol={}&interval={}&limit={}",
                self.base_url,
                urlencoding::encode(&market_symbol(ticker)),
                interval,
                limit
            );
            let body = self.get(url).await?;
            parse_klines(ticker, period, &body)
        })
    }
}

#[derive(Debug, Deserialize)]
struct BinanceTickerPrice {
    price: String,
}

fn market_symbol(ticker: Ticker) -> String {
    format!("{}USDT", ticker.as_str())
}

/// Kline interval and row limit covering each period.
fn kline_plan(period: Period) -> (&'static str, u16) {
    match period {
        Period::OneHour => ("1m", 60),
        Period::OneDay => ("15m", 96),
        Period::SevenDays => ("1h", 168),
        Period::ThirtyDays => ("4h", 180),
        Period::OneYear => ("1d", 365),
        Period::All => ("1w", 1_000),
    }
}

fn parse_ticker_price(ticker: Ticker, body: &str) -> Result<PriceSample, SourceError> {
    let payload: BinanceTickerPrice = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse binance price: {e}")))?;

    let price = payload.price.parse::<f64>().map_err(|_| {
        SourceError::malformed(format!("binance price '{}' is not a number", payload.price))
    })?;

    PriceSample::new(ticker, ProviderId::Binance, price, UtcDateTime::now())
        .map_err(|e| SourceError::malformed(format!("binance price rejected: {e}")))
}

fn parse_klines(ticker: Ticker, period: Period, body: &str) -> Result<PriceSeries, SourceError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse binance klines: {e}")))?;

    let points: Vec<PricePoint> = rows
        .iter()
        .filter_map(|row| {
            let point = kline_point(row);
            if point.is_none() {
                debug!(source = "binance", "skipping unusable kline row");
            }
            point
        })
        .collect();

    if points.is_empty() && !rows.is_empty() {
        return Err(SourceError::malformed(format!(
            "none of the {} binance kline rows could be parsed",
            rows.len()
        )));
    }

    Ok(PriceSeries::new(ticker, ProviderId::Binance, period, points))
}

fn kline_point(row: &[Value]) -> Option<PricePoint> {
    let open_time = row.first()?.as_i64()?;
    let close = row.get(4)?.as_str()?.parse::<f64>().ok()?;
    let ts = UtcDateTime::from_unix_millis(open_time).ok()?;
    PricePoint::new(ts, close).ok()
}
