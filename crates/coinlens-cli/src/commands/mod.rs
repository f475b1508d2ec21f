mod chart;
mod compare;
mod price;
mod report;

use std::sync::Arc;

use coinlens_core::{
    Aggregated, Aggregator, AggregatorConfig, ProviderId, SampleSink, SinkError, SourceSettings,
    Warehouse,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, EnvelopeError, Metadata};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub source_chain: Vec<ProviderId>,
}

impl CommandResult {
    /// Result computed without calling any upstream.
    pub fn offline(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
            source_chain: Vec::new(),
        }
    }

    pub fn from_aggregated<T: Serialize>(aggregated: Aggregated<T>) -> Result<Self, CliError> {
        Ok(Self {
            data: serde_json::to_value(&aggregated.data)?,
            warnings: Vec::new(),
            errors: aggregated.failures.iter().map(EnvelopeError::from).collect(),
            latency_ms: aggregated.latency_ms,
            cache_hit: aggregated.cache_hit,
            source_chain: aggregated.source_chain,
        })
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let command_result = match &cli.command {
        Command::Price(args) => {
            let (aggregator, warnings) = build_aggregator(!cli.no_store)?;
            price::run(args, &aggregator).await?.with_warnings(warnings)
        }
        Command::Compare(args) => {
            let (aggregator, warnings) = build_aggregator(false)?;
            compare::run(args, &aggregator).await?.with_warnings(warnings)
        }
        Command::Chart(args) => {
            let (aggregator, warnings) = build_aggregator(false)?;
            chart::run(args, &aggregator).await?.with_warnings(warnings)
        }
        Command::Report(args) => report::run(args).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        cache_hit,
        source_chain,
    } = command_result;

    let mut meta = Metadata::new(source_chain, latency_ms, cache_hit);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope { meta, data, errors })
}

/// Aggregator with the default sources and, when `store` is set, the local
/// warehouse as sample sink. A warehouse that cannot be opened only costs
/// durability, so it becomes a warning.
fn build_aggregator(store: bool) -> Result<(Aggregator, Vec<String>), CliError> {
    let config = AggregatorConfig::from_env()?;
    let mut builder = Aggregator::builder()
        .with_config(config)
        .with_default_sources_from(SourceSettings::from_env());
    let mut warnings = Vec::new();

    if store {
        match Warehouse::open_default() {
            Ok(warehouse) => {
                let sink: Arc<dyn SampleSink> = Arc::new(warehouse);
                builder = builder.with_sink(sink);
            }
            Err(error) => {
                warn!(error = %error, "warehouse unavailable, samples will not be stored");
                warnings.push(format!(
                    "samples not stored: {}",
                    SinkError::from(error).message()
                ));
            }
        }
    }

    Ok((builder.build(), warnings))
}
