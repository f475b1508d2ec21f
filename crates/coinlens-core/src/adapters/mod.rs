//! Upstream price adapters.
//!
//! Each adapter is a thin request/response translation over an injectable
//! [`HttpClient`]; resilience (circuit breaker, rate budget) lives here, while
//! timeouts and fan-out are owned by the aggregator.

mod binance;
mod coingecko;

pub use binance::BinanceAdapter;
pub use coingecko::CoinGeckoAdapter;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::SourceError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::ProviderId;

/// Executes one GET through the breaker and maps transport/status failures.
///
/// Dropping the returned future mid-request counts against the breaker.
async fn fetch_body(
    provider: ProviderId,
    http_client: &dyn HttpClient,
    circuit_breaker: &CircuitBreaker,
    request: HttpRequest,
) -> Result<String, SourceError> {
    let call = circuit_breaker.call()?;

    let response = match http_client.execute(request).await {
        Ok(response) => response,
        Err(error) => {
            call.failed();
            return Err(if error.timed_out() {
                SourceError::unavailable(format!("{provider} request timed out: {}", error.message()))
            } else {
                SourceError::unavailable(format!("{provider} transport error: {}", error.message()))
            });
        }
    };

    if !response.is_success() {
        // Client errors describe our request, not upstream health.
        if response.status >= 500 || response.status == 429 || response.status == 418 {
            call.failed();
        } else {
            call.release();
        }
        return Err(status_error(provider, &response));
    }

    call.succeeded();
    Ok(response.body)
}

fn status_error(provider: ProviderId, response: &HttpResponse) -> SourceError {
    match response.status {
        418 | 429 => SourceError::rate_limited(format!(
            "{provider} upstream returned status {} (rate limited)",
            response.status
        )),
        400..=499 => SourceError::invalid_request(format!(
            "{provider} upstream rejected request with status {}: {}",
            response.status,
            truncate(&response.body, 200)
        )),
        status => SourceError::unavailable(format!(
            "{provider} upstream returned status {status}"
        )),
    }
}

fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
