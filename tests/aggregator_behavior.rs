//! Behavior-driven tests for the aggregator
//!
//! These tests verify HOW the aggregator reconciles unreliable sources:
//! caching, partial failure, timeouts, single-flight and the sample sink.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coinlens_core::{
    AggregateError, Aggregator, AggregatorConfig, BinanceAdapter, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, DataSource, Fingerprint, HttpClient, HttpError,
    HttpRequest, HttpResponse, Period, PricePoint, PriceSample, PriceSeries, ProviderId,
    SampleSink, SinkError, SourceError, SourceErrorKind, SourceFuture, Ticker, UtcDateTime,
};

// =============================================================================
// Test doubles
// =============================================================================

/// Source answering from fixed prices, counting calls, optionally slow or failing.
struct ScriptedSource {
    id: ProviderId,
    prices: Vec<f64>,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedSource {
    fn new(id: ProviderId, prices: &[f64]) -> Self {
        Self {
            id,
            prices: prices.to_vec(),
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, build: impl FnOnce() -> T) -> Result<T, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(format!("{} is down", self.id)));
        }
        Ok(build())
    }
}

impl DataSource for ScriptedSource {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch_current<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, PriceSample> {
        Box::pin(async move {
            let price = self.prices.first().copied().unwrap_or(1.0);
            self.answer(|| {
                PriceSample::new(ticker, self.id, price, ts(0)).expect("valid sample")
            })
            .await
        })
    }

    fn fetch_history<'a>(
        &'a self,
        ticker: Ticker,
        period: Period,
    ) -> SourceFuture<'a, PriceSeries> {
        Box::pin(async move {
            self.answer(|| {
                let points = self
                    .prices
                    .iter()
                    .enumerate()
                    .map(|(index, price)| {
                        PricePoint::new(ts(index as i64 * 60_000), *price).expect("valid point")
                    })
                    .collect();
                PriceSeries::new(ticker, self.id, period, points)
            })
            .await
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    appended: Mutex<Vec<PriceSample>>,
}

impl SampleSink for RecordingSink {
    fn append(&self, samples: &[PriceSample]) -> Result<(), SinkError> {
        self.appended
            .lock()
            .expect("sink log is not poisoned")
            .extend_from_slice(samples);
        Ok(())
    }
}

struct BrokenSink {
    attempts: AtomicUsize,
}

impl SampleSink for BrokenSink {
    fn append(&self, _samples: &[PriceSample]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::new("disk full"))
    }
}

/// Transport whose requests never complete.
struct HangingHttpClient;

impl HttpClient for HangingHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}

fn ts(millis: i64) -> UtcDateTime {
    UtcDateTime::from_unix_millis(1_704_067_200_000 + millis).expect("valid millis")
}

fn aggregator(sources: &[Arc<ScriptedSource>]) -> Aggregator {
    sources
        .iter()
        .fold(Aggregator::builder(), |builder, source| {
            builder.with_source(source.clone())
        })
        .build()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn when_history_is_requested_twice_within_ttl_sources_are_called_once() {
    // Given: Two healthy sources
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[100.0, 110.0, 90.0]));
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[101.0, 109.0]));
    let aggregator = aggregator(&[binance.clone(), coingecko.clone()]);

    // When: The same history is requested twice
    let first = aggregator
        .history(Ticker::Btc, Period::SevenDays)
        .await
        .expect("first call succeeds");
    let second = aggregator
        .history(Ticker::Btc, Period::SevenDays)
        .await
        .expect("second call succeeds");

    // Then: The payload is identical and no second fan-out happened
    assert_eq!(first.data, second.data);
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert!(second.source_chain.is_empty());
    assert_eq!(binance.calls(), 1);
    assert_eq!(coingecko.calls(), 1);
}

#[tokio::test]
async fn when_periods_differ_each_gets_its_own_fan_out() {
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[100.0]));
    let aggregator = aggregator(&[binance.clone()]);

    aggregator
        .history(Ticker::Eth, Period::OneDay)
        .await
        .expect("24h succeeds");
    aggregator
        .history(Ticker::Eth, Period::SevenDays)
        .await
        .expect("7d succeeds");

    assert_eq!(binance.calls(), 2);
    assert_eq!(aggregator.cache().len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn when_current_ttl_elapses_the_next_call_fans_out_again() {
    // Given: A cached current price (TTL 10s)
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[64_000.0]));
    let aggregator = aggregator(&[binance.clone()]);
    aggregator.current(Ticker::Btc).await.expect("first call");

    // When: 9.9s pass, the cache still answers
    tokio::time::advance(Duration::from_millis(9_900)).await;
    let cached = aggregator.current(Ticker::Btc).await.expect("cached call");
    assert!(cached.cache_hit);

    // Then: Past 10s the entry is gone and the source is called again
    tokio::time::advance(Duration::from_millis(200)).await;
    let refreshed = aggregator.current(Ticker::Btc).await.expect("refreshed call");
    assert!(!refreshed.cache_hit);
    assert_eq!(binance.calls(), 2);
}

// =============================================================================
// Partial and total failure
// =============================================================================

#[tokio::test]
async fn when_one_source_fails_result_contains_only_the_other() {
    // Given: Binance fails, CoinGecko succeeds
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[1.0]).failing());
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[64_100.0]));
    let aggregator = aggregator(&[binance, coingecko]);

    // When: The current price is requested
    let result = aggregator
        .current(Ticker::Btc)
        .await
        .expect("partial success is success");

    // Then: Only CoinGecko's sample is present and the failure is reported
    assert_eq!(result.data.samples.len(), 1);
    assert_eq!(result.data.samples[0].source, ProviderId::Coingecko);
    assert_eq!(
        result.source_chain,
        vec![ProviderId::Binance, ProviderId::Coingecko]
    );
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].source, ProviderId::Binance);
    assert_eq!(result.failures[0].error.kind(), SourceErrorKind::Unavailable);
}

#[tokio::test]
async fn when_all_sources_fail_request_reports_no_data_and_cache_is_untouched() {
    // Given: Every source fails
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[100.0]).failing());
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[101.0]).failing());
    let aggregator = aggregator(&[binance.clone(), coingecko.clone()]);

    // When: History is requested
    let error = aggregator
        .history(Ticker::Sol, Period::OneDay)
        .await
        .expect_err("all failed");

    // Then: NoData carries both failures and nothing was cached
    match &error {
        AggregateError::NoData { request, failures } => {
            assert_eq!(request, "history:SOL:24h");
            assert_eq!(failures.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(aggregator
        .cache()
        .lookup(&Fingerprint::history(Ticker::Sol, Period::OneDay))
        .await
        .is_none());

    // And: Once a source recovers, the next call fans out and succeeds
    coingecko.failing.store(false, Ordering::SeqCst);
    let recovered = aggregator
        .history(Ticker::Sol, Period::OneDay)
        .await
        .expect("recovered");
    assert!(!recovered.cache_hit);
    assert_eq!(coingecko.calls(), 2);
}

#[tokio::test]
async fn when_every_series_is_empty_history_is_no_data() {
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[]));
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[]));
    let aggregator = aggregator(&[binance, coingecko]);

    let error = aggregator
        .history(Ticker::Eth, Period::ThirtyDays)
        .await
        .expect_err("no points anywhere");

    match error {
        AggregateError::NoData { failures, .. } => assert!(failures.is_empty()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn when_one_series_is_empty_comparison_keeps_it_with_absent_stats() {
    // Given: Binance answers with nothing, CoinGecko with three points
    let binance = Arc::new(ScriptedSource::new(ProviderId::Binance, &[]));
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[100.0, 110.0, 90.0]));
    let aggregator = aggregator(&[binance, coingecko]);

    // When: A comparison is requested
    let comparison = aggregator
        .compare(Ticker::Btc, Period::SevenDays)
        .await
        .expect("one non-empty series is enough");

    // Then: Both sources appear; only CoinGecko has stats
    let sources = &comparison.data.sources;
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[&ProviderId::Binance], None);
    let stats = sources[&ProviderId::Coingecko].expect("stats present");
    assert_eq!(stats.min, 90.0);
    assert_eq!(stats.max, 110.0);
    assert_eq!(stats.mean, 100.0);
    assert_eq!(stats.volatility_pct, 22.22);
}

// =============================================================================
// Timeouts, cancellation, single-flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_a_source_is_slow_it_times_out_without_delaying_siblings_beyond_the_budget() {
    // Given: Binance takes a minute, CoinGecko answers immediately
    let binance = Arc::new(
        ScriptedSource::new(ProviderId::Binance, &[1.0]).slow(Duration::from_secs(60)),
    );
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[2.0, 3.0]));
    let aggregator = aggregator(&[binance.clone(), coingecko]);

    // When: History is requested with the default 15s budget
    let started = tokio::time::Instant::now();
    let result = aggregator
        .history(Ticker::Btc, Period::OneDay)
        .await
        .expect("coingecko still answers");

    // Then: The call returns at the budget with Binance recorded as a timeout
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(15));
    assert!(waited < Duration::from_secs(16));
    assert_eq!(result.data.series.len(), 1);
    assert_eq!(result.failures[0].source, ProviderId::Binance);
    assert_eq!(result.failures[0].error.kind(), SourceErrorKind::Timeout);
    assert_eq!(binance.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn when_an_adapter_outlives_its_budget_its_circuit_breaker_counts_the_timeout() {
    // Given: A Binance adapter whose transport hangs, behind a breaker that trips on one failure
    let breaker = Arc::new(CircuitBreaker::new(
        ProviderId::Binance,
        CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_secs(30),
        },
    ));
    let binance = BinanceAdapter::with_http_client(Arc::new(HangingHttpClient))
        .with_base_url("https://binance.test")
        .with_circuit_breaker(breaker.clone());
    let coingecko = Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[64_010.0]));
    let aggregator = Aggregator::builder()
        .with_source(Arc::new(binance))
        .with_source(coingecko)
        .build();

    // When: A current price is requested with the default 10s budget
    let result = aggregator
        .current(Ticker::Btc)
        .await
        .expect("coingecko still answers");

    // Then: The timeout is reported and the cancelled call opened the breaker
    assert_eq!(result.failures[0].source, ProviderId::Binance);
    assert_eq!(result.failures[0].error.kind(), SourceErrorKind::Timeout);
    wait_until(|| breaker.state() == CircuitState::Open).await;
}

#[tokio::test(start_paused = true)]
async fn when_the_caller_gives_up_outstanding_source_calls_are_aborted() {
    let binance = Arc::new(
        ScriptedSource::new(ProviderId::Binance, &[1.0]).slow(Duration::from_secs(5)),
    );
    let aggregator = aggregator(&[binance.clone()]);

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), aggregator.current(Ticker::Eth)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(binance.calls(), 1);
    assert_eq!(binance.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn when_misses_overlap_they_share_a_single_fan_out() {
    // Given: A source that takes 2s to answer
    let binance = Arc::new(
        ScriptedSource::new(ProviderId::Binance, &[100.0, 101.0]).slow(Duration::from_secs(2)),
    );
    let aggregator = Arc::new(aggregator(&[binance.clone()]));

    // When: Five callers ask for the same history at once
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move { aggregator.history(Ticker::Btc, Period::OneHour).await })
        })
        .collect();

    let mut payloads = Vec::new();
    for handle in handles {
        let result = handle.await.expect("task joins").expect("history succeeds");
        payloads.push(result.data);
    }

    // Then: The source was called once and everybody got the same payload
    assert_eq!(binance.calls(), 1);
    assert!(payloads.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(start_paused = true)]
async fn when_ttl_and_timeouts_are_configured_they_override_defaults() {
    let binance = Arc::new(
        ScriptedSource::new(ProviderId::Binance, &[1.0]).slow(Duration::from_secs(3)),
    );
    let aggregator = Aggregator::builder()
        .with_source(binance.clone())
        .with_config(AggregatorConfig {
            current_timeout: Duration::from_secs(1),
            ..AggregatorConfig::default()
        })
        .build();

    let error = aggregator
        .current(Ticker::Btc)
        .await
        .expect_err("1s budget is too short");
    match error {
        AggregateError::NoData { failures, .. } => {
            assert_eq!(failures[0].error.kind(), SourceErrorKind::Timeout)
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Sample sink
// =============================================================================

#[tokio::test]
async fn when_current_prices_are_fetched_the_sink_receives_them() {
    let sink = Arc::new(RecordingSink::default());
    let aggregator = Aggregator::builder()
        .with_source(Arc::new(ScriptedSource::new(ProviderId::Binance, &[64_000.0])))
        .with_source(Arc::new(ScriptedSource::new(ProviderId::Coingecko, &[64_010.0])))
        .with_sink(sink.clone())
        .build();

    aggregator.current(Ticker::Btc).await.expect("current succeeds");

    wait_until(|| sink.appended.lock().expect("not poisoned").len() == 2).await;

    // A cache hit does not append again.
    aggregator.current(Ticker::Btc).await.expect("cached");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sink.appended.lock().expect("not poisoned").len(), 2);
}

#[tokio::test]
async fn when_the_sink_fails_the_request_still_succeeds() {
    let sink = Arc::new(BrokenSink {
        attempts: AtomicUsize::new(0),
    });
    let aggregator = Aggregator::builder()
        .with_source(Arc::new(ScriptedSource::new(ProviderId::Binance, &[3_000.0])))
        .with_sink(sink.clone())
        .build();

    let result = aggregator.current(Ticker::Eth).await;

    assert!(result.is_ok());
    wait_until(|| sink.attempts.load(Ordering::SeqCst) == 1).await;
}
