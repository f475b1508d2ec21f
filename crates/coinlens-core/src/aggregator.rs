//! Fan-out, cache and analytics orchestration.
//!
//! ```text
//! RECEIVED -> CACHE_CHECK -> CACHE_HIT ------------------------------> DONE
//!                         \-> FANOUT -> COLLECT -> ALL_FAILED --------> ERROR
//!                                              \-> SOME_SUCCEEDED -> CACHE_WRITE -> DONE
//! ```
//!
//! Every registered source that supports the request kind is called
//! concurrently, each under its own timeout. Failed calls are logged and
//! dropped; the result is the union of whatever succeeded. Concurrent misses
//! on the same fingerprint share a single fan-out.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapters::{BinanceAdapter, CoinGeckoAdapter};
use crate::cache::{CacheStore, CachedPayload, Fetched, Fingerprint, Slot};
use crate::config::{AggregatorConfig, SourceSettings};
use crate::data_source::{DataSource, HistoryBatch, SampleBatch, SourceError, SourceFuture};
use crate::error::{AggregateError, SourceFailure};
use crate::http_client::ReqwestHttpClient;
use crate::report::{self, ChartOverlay, ComparisonResult};
use crate::sink::SampleSink;
use crate::{Period, PriceSample, ProviderId, Ticker};

/// Successful aggregated call.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated<T> {
    pub data: T,
    /// `true` when answered from the cache without any upstream call.
    pub cache_hit: bool,
    /// Sources that were called, in registration order. Empty on a cache hit.
    pub source_chain: Vec<ProviderId>,
    /// Calls that contributed nothing.
    pub failures: Vec<SourceFailure>,
    pub latency_ms: u64,
}

impl<T> Aggregated<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Aggregated<U> {
        Aggregated {
            data: f(self.data),
            cache_hit: self.cache_hit,
            source_chain: self.source_chain,
            failures: self.failures,
            latency_ms: self.latency_ms,
        }
    }
}

/// Builder for [`Aggregator`].
///
/// ```rust,ignore
/// use coinlens_core::{AggregatorBuilder, AggregatorConfig};
///
/// let aggregator = AggregatorBuilder::new()
///     .with_config(AggregatorConfig::from_env()?)
///     .with_default_sources()
///     .build();
/// ```
#[derive(Default)]
pub struct AggregatorBuilder {
    sources: Vec<Arc<dyn DataSource>>,
    default_sources: Option<SourceSettings>,
    sink: Option<Arc<dyn SampleSink>>,
    config: AggregatorConfig,
    cache: Option<CacheStore>,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source. A later source with the same id replaces the
    /// earlier one in place.
    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        register(&mut self.sources, source);
        self
    }

    /// Registers Binance and CoinGecko over the reqwest transport, reading
    /// endpoint overrides and the CoinGecko key from the environment.
    pub fn with_default_sources(self) -> Self {
        self.with_default_sources_from(SourceSettings::from_env())
    }

    pub fn with_default_sources_from(mut self, settings: SourceSettings) -> Self {
        self.default_sources = Some(settings);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing cache instead of creating a private one.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Aggregator {
        let mut sources = Vec::new();
        if let Some(settings) = &self.default_sources {
            for source in default_sources(settings, &self.config) {
                register(&mut sources, source);
            }
        }
        for source in self.sources {
            register(&mut sources, source);
        }

        Aggregator {
            sources,
            cache: self.cache.unwrap_or_default(),
            sink: self.sink,
            config: self.config,
        }
    }
}

fn register(sources: &mut Vec<Arc<dyn DataSource>>, source: Arc<dyn DataSource>) {
    match sources.iter_mut().find(|existing| existing.id() == source.id()) {
        Some(slot) => *slot = source,
        None => sources.push(source),
    }
}

fn default_sources(
    settings: &SourceSettings,
    config: &AggregatorConfig,
) -> Vec<Arc<dyn DataSource>> {
    // The aggregator timeout is the binding one; the transport only needs
    // to outlive it. A call cut off by the aggregator still counts against
    // the adapter's circuit breaker when its future is dropped.
    let transport_timeout_ms = config
        .current_timeout
        .max(config.history_timeout)
        .as_millis()
        .min(u128::from(u64::MAX)) as u64;
    let http_client = Arc::new(ReqwestHttpClient::new());

    let mut binance =
        BinanceAdapter::with_http_client(http_client.clone()).with_timeout_ms(transport_timeout_ms);
    if let Some(base_url) = &settings.binance_base_url {
        binance = binance.with_base_url(base_url.clone());
    }

    let mut coingecko =
        CoinGeckoAdapter::with_http_client(http_client).with_timeout_ms(transport_timeout_ms);
    if let Some(base_url) = &settings.coingecko_base_url {
        coingecko = coingecko.with_base_url(base_url.clone());
    }
    if let Some(api_key) = &settings.coingecko_api_key {
        coingecko = coingecko.with_api_key(api_key.clone());
    }

    vec![Arc::new(binance), Arc::new(coingecko)]
}

/// Multi-source price aggregator. Owns its cache; share it behind an `Arc`.
pub struct Aggregator {
    sources: Vec<Arc<dyn DataSource>>,
    cache: CacheStore,
    sink: Option<Arc<dyn SampleSink>>,
    config: AggregatorConfig,
}

struct FanOut<T> {
    source_chain: Vec<ProviderId>,
    successes: Vec<(ProviderId, T)>,
    failures: Vec<SourceFailure>,
}

struct Resolved {
    payload: CachedPayload,
    provenance: Provenance,
}

struct Provenance {
    cache_hit: bool,
    source_chain: Vec<ProviderId>,
    failures: Vec<SourceFailure>,
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Registered source ids, in registration order.
    pub fn source_ids(&self) -> Vec<ProviderId> {
        self.sources.iter().map(|source| source.id()).collect()
    }

    /// Current price from every source that answered.
    pub async fn current(
        &self,
        ticker: Ticker,
    ) -> Result<Aggregated<SampleBatch>, AggregateError> {
        let started = Instant::now();
        let key = Fingerprint::current(ticker);
        let Resolved {
            payload,
            provenance,
        } = self.resolve(key, self.fetch_current(key, ticker)).await?;

        match payload {
            CachedPayload::Samples(batch) => Ok(finish(batch, provenance, started)),
            CachedPayload::History(_) => Err(inconsistent_slot(key)),
        }
    }

    /// Per-source history. Sources that answered with an empty series keep
    /// an empty entry.
    pub async fn history(
        &self,
        ticker: Ticker,
        period: Period,
    ) -> Result<Aggregated<HistoryBatch>, AggregateError> {
        let started = Instant::now();
        let key = Fingerprint::history(ticker, period);
        let Resolved {
            payload,
            provenance,
        } = self
            .resolve(key, self.fetch_history(key, ticker, period))
            .await?;

        match payload {
            CachedPayload::History(batch) => Ok(finish(batch, provenance, started)),
            CachedPayload::Samples(_) => Err(inconsistent_slot(key)),
        }
    }

    /// History plus per-source stats.
    pub async fn compare(
        &self,
        ticker: Ticker,
        period: Period,
    ) -> Result<Aggregated<ComparisonResult>, AggregateError> {
        let history = self.history(ticker, period).await?;
        Ok(history.map(|batch| report::build_comparison(ticker, period, &batch.series)))
    }

    /// History plus the numeric chart overlay (trend, anomalies, extremes).
    pub async fn chart(
        &self,
        ticker: Ticker,
        period: Period,
    ) -> Result<Aggregated<ChartOverlay>, AggregateError> {
        let history = self.history(ticker, period).await?;
        Ok(history.map(|batch| report::build_chart_overlay(ticker, period, &batch.series)))
    }

    async fn resolve<Fut>(&self, key: Fingerprint, fetch: Fut) -> Result<Resolved, AggregateError>
    where
        Fut: Future<Output = Result<Fetched, AggregateError>>,
    {
        let flight = match self.cache.begin(&key).await {
            Slot::Fresh(payload) => {
                debug!(request = %key, "cache hit");
                return Ok(Resolved {
                    payload,
                    provenance: Provenance {
                        cache_hit: true,
                        source_chain: Vec::new(),
                        failures: Vec::new(),
                    },
                });
            }
            Slot::InFlight(flight) => flight,
        };

        let outcome = flight
            .get_or_init(|| async {
                let fetched = fetch.await;
                if let Ok(fetched) = &fetched {
                    self.cache
                        .store(key, fetched.payload.clone(), self.config.ttl(key.kind))
                        .await;
                }
                fetched
            })
            .await
            .clone();
        self.cache.finish(&key, &flight).await;

        outcome.map(|fetched| Resolved {
            payload: fetched.payload,
            provenance: Provenance {
                cache_hit: false,
                source_chain: fetched.source_chain,
                failures: fetched.failures,
            },
        })
    }

    async fn fetch_current(
        &self,
        key: Fingerprint,
        ticker: Ticker,
    ) -> Result<Fetched, AggregateError> {
        let fan_out = self
            .fan_out(key, move |source| source.fetch_current(ticker))
            .await?;

        let samples: Vec<PriceSample> = fan_out
            .successes
            .into_iter()
            .map(|(_, sample)| sample)
            .collect();
        if samples.is_empty() {
            warn!(request = %key, failures = fan_out.failures.len(), "no source returned data");
            return Err(AggregateError::no_data(key.to_string(), fan_out.failures));
        }

        self.forward_to_sink(&samples);

        Ok(Fetched {
            payload: CachedPayload::Samples(SampleBatch { ticker, samples }),
            source_chain: fan_out.source_chain,
            failures: fan_out.failures,
        })
    }

    async fn fetch_history(
        &self,
        key: Fingerprint,
        ticker: Ticker,
        period: Period,
    ) -> Result<Fetched, AggregateError> {
        let fan_out = self
            .fan_out(key, move |source| source.fetch_history(ticker, period))
            .await?;

        let batch = HistoryBatch {
            ticker,
            period,
            series: fan_out.successes.into_iter().collect::<BTreeMap<_, _>>(),
        };
        if !batch.has_points() {
            warn!(
                request = %key,
                answered = batch.series.len(),
                failures = fan_out.failures.len(),
                "no source returned any history points"
            );
            return Err(AggregateError::no_data(key.to_string(), fan_out.failures));
        }

        Ok(Fetched {
            payload: CachedPayload::History(batch),
            source_chain: fan_out.source_chain,
            failures: fan_out.failures,
        })
    }

    /// Calls every capable source concurrently and waits for all of them.
    /// Dropping the returned future aborts the outstanding calls.
    async fn fan_out<T, F>(&self, key: Fingerprint, invoke: F) -> Result<FanOut<T>, AggregateError>
    where
        T: Send + 'static,
        F: for<'a> Fn(&'a dyn DataSource) -> SourceFuture<'a, T> + Clone + Send + Sync + 'static,
    {
        let budget = self.config.timeout(key.kind);
        let capable: Vec<(usize, Arc<dyn DataSource>)> = self
            .sources
            .iter()
            .filter(|source| source.capabilities().supports(key.kind))
            .cloned()
            .enumerate()
            .collect();

        if capable.is_empty() {
            return Err(AggregateError::Configuration(format!(
                "no registered source supports {} requests",
                key.kind
            )));
        }

        let source_chain: Vec<ProviderId> = capable.iter().map(|(_, source)| source.id()).collect();
        info!(request = %key, sources = capable.len(), "fanning out to sources");

        let mut tasks = JoinSet::new();
        for (index, source) in capable {
            let invoke = invoke.clone();
            tasks.spawn(async move {
                let provider = source.id();
                let outcome = match tokio::time::timeout(budget, invoke(source.as_ref())).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SourceError::timeout(budget)),
                };
                (index, provider, outcome)
            });
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, provider, Ok(value))) => successes.push((index, provider, value)),
                Ok((index, provider, Err(source_error))) => {
                    warn!(
                        request = %key,
                        source = %provider,
                        code = source_error.code(),
                        error = %source_error,
                        "source call failed"
                    );
                    failures.push((index, SourceFailure::new(provider, source_error)));
                }
                Err(join_error) => {
                    error!(request = %key, error = %join_error, "source task did not complete");
                }
            }
        }

        successes.sort_by_key(|(index, _, _)| *index);
        failures.sort_by_key(|(index, _)| *index);

        Ok(FanOut {
            source_chain,
            successes: successes
                .into_iter()
                .map(|(_, provider, value)| (provider, value))
                .collect(),
            failures: failures.into_iter().map(|(_, failure)| failure).collect(),
        })
    }

    fn forward_to_sink(&self, samples: &[PriceSample]) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let samples = samples.to_vec();
        // Detached: the request never waits on durability.
        drop(tokio::task::spawn_blocking(move || {
            if let Err(sink_error) = sink.append(&samples) {
                warn!(error = %sink_error, samples = samples.len(), "sample sink append failed");
            }
        }));
    }
}

fn finish<T>(data: T, provenance: Provenance, started: Instant) -> Aggregated<T> {
    Aggregated {
        data,
        cache_hit: provenance.cache_hit,
        source_chain: provenance.source_chain,
        failures: provenance.failures,
        latency_ms: elapsed_ms(started),
    }
}

fn inconsistent_slot(key: Fingerprint) -> AggregateError {
    AggregateError::Configuration(format!("cache slot '{key}' holds the wrong payload kind"))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{CapabilitySet, RequestKind};
    use crate::{PriceSeries, UtcDateTime};

    struct CurrentOnly;

    impl DataSource for CurrentOnly {
        fn id(&self) -> ProviderId {
            ProviderId::Binance
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::new(true, false)
        }

        fn fetch_current<'a>(&'a self, ticker: Ticker) -> SourceFuture<'a, PriceSample> {
            Box::pin(async move {
                PriceSample::new(ticker, ProviderId::Binance, 1.0, UtcDateTime::now())
                    .map_err(|e| SourceError::internal(e.to_string()))
            })
        }

        fn fetch_history<'a>(
            &'a self,
            _ticker: Ticker,
            _period: Period,
        ) -> SourceFuture<'a, PriceSeries> {
            Box::pin(async { Err(SourceError::unsupported_request(RequestKind::History)) })
        }
    }

    #[tokio::test]
    async fn history_without_capable_source_is_a_configuration_error() {
        let aggregator = Aggregator::builder()
            .with_source(Arc::new(CurrentOnly))
            .build();

        let error = aggregator
            .history(Ticker::Btc, Period::OneDay)
            .await
            .expect_err("no history source");
        assert!(matches!(error, AggregateError::Configuration(_)));

        let current = aggregator.current(Ticker::Btc).await.expect("current works");
        assert_eq!(current.data.samples.len(), 1);
        assert_eq!(current.source_chain, vec![ProviderId::Binance]);
    }

    #[test]
    fn later_registration_replaces_same_id() {
        let aggregator = Aggregator::builder()
            .with_default_sources_from(SourceSettings::default())
            .with_source(Arc::new(CurrentOnly))
            .build();

        assert_eq!(
            aggregator.source_ids(),
            vec![ProviderId::Binance, ProviderId::Coingecko]
        );
        assert!(!aggregator.sources[0].capabilities().history);
    }
}
