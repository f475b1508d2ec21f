use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::fetch_body;
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{DataSource, SourceError, SourceFuture};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::throttling::RateBudget;
use crate::{Period, PricePoint, PriceSample, PriceSeries, ProviderId, Ticker, UtcDateTime};

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

const DEMO_API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko adapter (`/simple/price`, `/coins/{id}/market_chart`).
///
/// A missing `prices` field is malformed, an empty `prices` array is an
/// empty series. A simple-price response without the requested coin id is
/// reported as [`SourceError::no_data`].
pub struct CoinGeckoAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    circuit_breaker: Arc<CircuitBreaker>,
    rate_budget: RateBudget,
    timeout_ms: u64,
}

impl Default for CoinGeckoAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl CoinGeckoAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(COINGECKO_BASE_URL),
            auth: HttpAuth::None,
            circuit_breaker: Arc::new(CircuitBreaker::with_defaults(ProviderId::Coingecko)),
            rate_budget: RateBudget::coingecko_public(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Sends the demo-tier key with every request. Blank keys are ignored.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.auth = if api_key.trim().is_empty() {
            HttpAuth::None
        } else {
            HttpAuth::Header {
                name: String::from(DEMO_API_KEY_HEADER),
                value: api_key.trim().to_owned(),
            }
        };
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_rate_budget(mut self, rate_budget: RateBudget) -> Self {
        self.rate_budget = rate_budget;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn get(&self, url: String) -> Result<String, SourceError> {
        self.rate_budget.acquire()?;
        let request = HttpRequest::get(url)
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);
        fetch_body(
            ProviderId::Coingecko,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            request,
        )
        .await
    }
}

impl DataSource for CoinGeckoAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Coingecko
    }

    fn fetch_current<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, PriceSample> {
        Box::pin(async move {
            let url = format!(
                "{}/simple/price?ids={}&vs_currencies=usd&include_last_updated_at=true",
                self.base_url,
                urlencoding::encode(coin_id(ticker))
            );
            let body = self.get(url).await?;
            parse_simple_price(ticker, &body)
        })
    }

    fn fetch_history<'a>(
        &'a self,
        ticker: Ticker,
        period: Period,
    ) -> SourceFuture<'a, PriceSeries> {
        Box::pin(async move {
            let url = format!(
                "{}/coins/{}/market_chart?vs_currency=usd&days={}",
                self.base_url,
                urlencoding::encode(coin_id(ticker)),
                chart_days(period)
            );
            let body = self.get(url).await?;
            let series = parse_market_chart(ticker, period, &body)?;
            Ok(trim_to_lookback(series))
        })
    }
}

#[derive(Debug, Deserialize)]
struct SimplePriceQuote {
    usd: Option<f64>,
    last_updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Option<Vec<Value>>,
}

fn coin_id(ticker: Ticker) -> &'static str {
    match ticker {
        Ticker::Btc => "bitcoin",
        Ticker::Eth => "ethereum",
        Ticker::Sol => "solana",
    }
}

/// Smallest `days` window the market chart endpoint serves for a period.
fn chart_days(period: Period) -> &'static str {
    match period {
        Period::OneHour | Period::OneDay => "1",
        Period::SevenDays => "7",
        Period::ThirtyDays => "30",
        Period::OneYear => "365",
        Period::All => "max",
    }
}

fn parse_simple_price(ticker: Ticker, body: &str) -> Result<PriceSample, SourceError> {
    let payload: HashMap<String, SimplePriceQuote> = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse coingecko price: {e}")))?;

    let id = coin_id(ticker);
    let quote = payload
        .get(id)
        .ok_or_else(|| SourceError::no_data(format!("coingecko returned no quote for '{id}'")))?;
    let price = quote
        .usd
        .ok_or_else(|| SourceError::no_data(format!("coingecko quote for '{id}' has no usd price")))?;

    let ts = quote
        .last_updated_at
        .and_then(|seconds| seconds.checked_mul(1_000))
        .and_then(|millis| UtcDateTime::from_unix_millis(millis).ok())
        .unwrap_or_else(UtcDateTime::now);

    PriceSample::new(ticker, ProviderId::Coingecko, price, ts)
        .map_err(|e| SourceError::malformed(format!("coingecko price rejected: {e}")))
}

fn parse_market_chart(
    ticker: Ticker,
    period: Period,
    body: &str,
) -> Result<PriceSeries, SourceError> {
    let payload: MarketChart = serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse coingecko chart: {e}")))?;

    let rows = payload
        .prices
        .ok_or_else(|| SourceError::malformed("coingecko chart payload has no 'prices' field"))?;

    let points: Vec<PricePoint> = rows
        .iter()
        .filter_map(|row| {
            let point = chart_point(row);
            if point.is_none() {
                debug!(source = "coingecko", "skipping unusable chart point");
            }
            point
        })
        .collect();

    if points.is_empty() && !rows.is_empty() {
        return Err(SourceError::malformed(format!(
            "none of the {} coingecko chart points could be parsed",
            rows.len()
        )));
    }

    Ok(PriceSeries::new(ticker, ProviderId::Coingecko, period, points))
}

fn chart_point(row: &Value) -> Option<PricePoint> {
    let pair = row.as_array()?;
    let millis = pair.first()?.as_f64()?;
    let price = pair.get(1)?.as_f64()?;
    let ts = UtcDateTime::from_unix_millis(millis as i64).ok()?;
    PricePoint::new(ts, price).ok()
}

/// The 1h period is served from the 1-day chart; keep the last hour only,
/// measured from the newest point.
fn trim_to_lookback(mut series: PriceSeries) -> PriceSeries {
    if series.period != Period::OneHour {
        return series;
    }
    let Some(latest) = series.points.last().map(|point| point.ts) else {
        return series;
    };
    let cutoff = latest.saturating_sub(Duration::from_secs(3_600));
    series.points.retain(|point| point.ts >= cutoff);
    series
}
