//! Aggregator and adapter settings.
//!
//! # Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `COINLENS_CURRENT_TTL_SECS` | `10` | Cache lifetime of current prices |
//! | `COINLENS_HISTORY_TTL_SECS` | `60` | Cache lifetime of histories |
//! | `COINLENS_CURRENT_TIMEOUT_MS` | `10000` | Per-source budget for current calls |
//! | `COINLENS_HISTORY_TIMEOUT_MS` | `15000` | Per-source budget for history calls |
//! | `COINLENS_BINANCE_BASE_URL` | public API | Binance endpoint override |
//! | `COINLENS_COINGECKO_BASE_URL` | public API | CoinGecko endpoint override |
//! | `COINLENS_COINGECKO_API_KEY` | - | Demo key (fallback `COINGECKO_API_KEY`) |

use std::env;
use std::time::Duration;

use crate::data_source::RequestKind;
use crate::ValidationError;

/// TTL and timeout policy per request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub current_ttl: Duration,
    pub history_ttl: Duration,
    pub current_timeout: Duration,
    pub history_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            current_ttl: Duration::from_secs(10),
            history_ttl: Duration::from_secs(60),
            current_timeout: Duration::from_secs(10),
            history_timeout: Duration::from_secs(15),
        }
    }
}

impl AggregatorConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup; unset variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            current_ttl: read_duration(&lookup, "COINLENS_CURRENT_TTL_SECS", Duration::from_secs)?
                .unwrap_or(defaults.current_ttl),
            history_ttl: read_duration(&lookup, "COINLENS_HISTORY_TTL_SECS", Duration::from_secs)?
                .unwrap_or(defaults.history_ttl),
            current_timeout: read_duration(
                &lookup,
                "COINLENS_CURRENT_TIMEOUT_MS",
                Duration::from_millis,
            )?
            .unwrap_or(defaults.current_timeout),
            history_timeout: read_duration(
                &lookup,
                "COINLENS_HISTORY_TIMEOUT_MS",
                Duration::from_millis,
            )?
            .unwrap_or(defaults.history_timeout),
        })
    }

    pub const fn ttl(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Current => self.current_ttl,
            RequestKind::History => self.history_ttl,
        }
    }

    pub const fn timeout(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Current => self.current_timeout,
            RequestKind::History => self.history_timeout,
        }
    }
}

/// Endpoint overrides and credentials for the built-in adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    pub binance_base_url: Option<String>,
    pub coingecko_base_url: Option<String>,
    pub coingecko_api_key: Option<String>,
}

impl SourceSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            binance_base_url: non_blank("COINLENS_BINANCE_BASE_URL"),
            coingecko_base_url: non_blank("COINLENS_COINGECKO_BASE_URL"),
            coingecko_api_key: non_blank("COINLENS_COINGECKO_API_KEY")
                .or_else(|| non_blank("COINGECKO_API_KEY")),
        }
    }
}

fn read_duration<F>(
    lookup: &F,
    name: &'static str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>, ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|value| Some(unit(value)))
        .map_err(|_| ValidationError::InvalidSetting { name, value: raw })
}
