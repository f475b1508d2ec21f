//! Contract tests shared by every data source adapter
//!
//! Each adapter runs against canned upstream payloads and must honor the same
//! observable contract: tagged samples, time-ordered series, empty history as
//! `Ok`, history with no usable row as malformed, and upstream failures as
//! `SourceError`s.

use std::sync::Arc;

use coinlens_core::{
    BinanceAdapter, CannedHttpClient, CoinGeckoAdapter, DataSource, HttpError, HttpResponse,
    Period, ProviderId, SourceErrorKind, Ticker,
};

const BINANCE_PRICE: &str = r#"{"symbol":"BTCUSDT","price":"64000.50000000"}"#;
const BINANCE_KLINES: &str = r#"[
    [1704070800000,"101.0","103.0","100.0","102.5","10",1704074399999,"0",1,"0","0","0"],
    [1704067200000,"100.0","102.0","99.0","101.0","10",1704070799999,"0",1,"0","0","0"]
]"#;

const COINGECKO_PRICE: &str = r#"{"bitcoin":{"usd":64010.25,"last_updated_at":1704067200}}"#;
const COINGECKO_CHART: &str = r#"{"prices":[[1704070800000,102.5],[1704067200000,101.0]]}"#;

struct SourceCase {
    id: ProviderId,
    current_route: &'static str,
    current_body: &'static str,
    history_route: &'static str,
    history_body: &'static str,
    empty_history_body: &'static str,
    unusable_history_body: &'static str,
    build: fn(CannedHttpClient) -> Arc<dyn DataSource>,
}

fn binance(client: CannedHttpClient) -> Arc<dyn DataSource> {
    Arc::new(BinanceAdapter::with_http_client(Arc::new(client)).with_base_url("https://binance.test"))
}

fn coingecko(client: CannedHttpClient) -> Arc<dyn DataSource> {
    Arc::new(
        CoinGeckoAdapter::with_http_client(Arc::new(client))
            .with_base_url("https://coingecko.test"),
    )
}

fn source_cases() -> Vec<SourceCase> {
    vec![
        SourceCase {
            id: ProviderId::Binance,
            current_route: "/api/v3/ticker/price",
            current_body: BINANCE_PRICE,
            history_route: "/api/v3/klines",
            history_body: BINANCE_KLINES,
            empty_history_body: "[]",
            unusable_history_body: r#"[[1704067200000,"1","2","0.5",64000.5,"1"]]"#,
            build: binance,
        },
        SourceCase {
            id: ProviderId::Coingecko,
            current_route: "/simple/price",
            current_body: COINGECKO_PRICE,
            history_route: "/market_chart",
            history_body: COINGECKO_CHART,
            empty_history_body: r#"{"prices":[]}"#,
            unusable_history_body: r#"{"prices":[[1704067200000,"64000.5"]]}"#,
            build: coingecko,
        },
    ]
}

impl SourceCase {
    fn healthy(&self) -> Arc<dyn DataSource> {
        (self.build)(
            CannedHttpClient::new()
                .with_route(self.current_route, HttpResponse::ok_json(self.current_body))
                .with_route(self.history_route, HttpResponse::ok_json(self.history_body)),
        )
    }

    fn answering(&self, response: HttpResponse) -> Arc<dyn DataSource> {
        (self.build)(
            CannedHttpClient::new()
                .with_route(self.current_route, response.clone())
                .with_route(self.history_route, response),
        )
    }
}

#[tokio::test]
async fn current_returns_a_positive_sample_tagged_with_the_source() {
    for case in source_cases() {
        let source = case.healthy();
        assert_eq!(source.id(), case.id);

        let sample = source
            .fetch_current(Ticker::Btc)
            .await
            .unwrap_or_else(|error| panic!("source '{}' current failed: {error}", case.id));

        assert_eq!(sample.ticker, Ticker::Btc, "source '{}': ticker", case.id);
        assert_eq!(sample.source, case.id, "source '{}': source tag", case.id);
        assert!(
            sample.price > 0.0,
            "source '{}': price must be positive",
            case.id
        );
    }
}

#[tokio::test]
async fn history_is_ordered_by_time_and_tagged_with_the_request() {
    for case in source_cases() {
        let series = case
            .healthy()
            .fetch_history(Ticker::Btc, Period::SevenDays)
            .await
            .unwrap_or_else(|error| panic!("source '{}' history failed: {error}", case.id));

        assert_eq!(series.source, case.id, "source '{}': source tag", case.id);
        assert_eq!(series.ticker, Ticker::Btc, "source '{}': ticker", case.id);
        assert_eq!(series.period, Period::SevenDays, "source '{}': period", case.id);
        assert_eq!(
            series.prices(),
            vec![101.0, 102.5],
            "source '{}': points sorted ascending",
            case.id
        );
        assert!(
            series.points.windows(2).all(|pair| pair[0].ts <= pair[1].ts),
            "source '{}': timestamps ascending",
            case.id
        );
    }
}

#[tokio::test]
async fn empty_upstream_history_is_an_empty_series_not_an_error() {
    for case in source_cases() {
        let source = case.answering(HttpResponse::ok_json(case.empty_history_body));

        let series = source
            .fetch_history(Ticker::Eth, Period::OneDay)
            .await
            .unwrap_or_else(|error| panic!("source '{}' empty history failed: {error}", case.id));

        assert!(series.is_empty(), "source '{}': empty series", case.id);
    }
}

#[tokio::test]
async fn history_with_no_usable_row_is_malformed_not_empty() {
    for case in source_cases() {
        let source = case.answering(HttpResponse::ok_json(case.unusable_history_body));

        let error = source
            .fetch_history(Ticker::Btc, Period::SevenDays)
            .await
            .expect_err("a drifted row schema must not read as an empty series");

        assert_eq!(
            error.kind(),
            SourceErrorKind::Malformed,
            "source '{}': unusable rows",
            case.id
        );
    }
}

#[tokio::test]
async fn upstream_failures_surface_as_source_errors() {
    let failures = [
        (HttpResponse::with_status(503, "down"), SourceErrorKind::Unavailable),
        (HttpResponse::with_status(429, "slow down"), SourceErrorKind::RateLimited),
        (HttpResponse::ok_json("not json"), SourceErrorKind::Malformed),
    ];

    for case in source_cases() {
        for (response, kind) in failures.clone() {
            let status = response.status;
            let error = case
                .answering(response)
                .fetch_history(Ticker::Sol, Period::ThirtyDays)
                .await
                .expect_err("failure response must not succeed");

            assert_eq!(
                error.kind(),
                kind,
                "source '{}': status {status} maps to {kind:?}",
                case.id
            );
        }
    }
}

#[tokio::test]
async fn transport_errors_are_unavailable() {
    for case in source_cases() {
        let source = (case.build)(
            CannedHttpClient::new().with_failure("", HttpError::new("connection reset")),
        );

        let error = source
            .fetch_current(Ticker::Btc)
            .await
            .expect_err("transport failure");

        assert_eq!(
            error.kind(),
            SourceErrorKind::Unavailable,
            "source '{}': transport error kind",
            case.id
        );
        assert!(error.retryable(), "source '{}': retryable", case.id);
    }
}
