//! CLI argument definitions for coinlens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `price` | Current price from every source |
//! | `compare` | Per-source stats over a period |
//! | `chart` | Numeric chart overlay (trend, anomalies, extremes) |
//! | `report` | Trend report over stored samples |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--no-store` | `false` | Do not write fetched prices to the warehouse |
//!
//! # Examples
//!
//! ```bash
//! coinlens price BTC
//! coinlens compare ETH --period 30d --pretty
//! coinlens report SOL --period 24h --format table
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Multi-source crypto price aggregator.
#[derive(Debug, Parser)]
#[command(
    name = "coinlens",
    author,
    version,
    about = "Multi-source crypto price aggregator",
    long_about = "coinlens asks every configured upstream (Binance, CoinGecko) for the same \
price or history, keeps whatever answers, and summarizes the result per source.\n\
\n\
Logging goes to stderr and is controlled by RUST_LOG (default: warn)."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Skip writing fetched current prices to the local warehouse.
    #[arg(long, global = true, default_value_t = false)]
    pub no_store: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object.
    Json,
    /// Human-readable key/value layout.
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Current price of a ticker from every source that answers.
    ///
    ///   coinlens price BTC
    Price(PriceArgs),

    /// Min, max, mean and volatility per source over a period.
    ///
    ///   coinlens compare ETH --period 30d
    Compare(PeriodArgs),

    /// Points, rolling trend, anomalies and extremes per source.
    ///
    ///   coinlens chart SOL --period 7d
    Chart(PeriodArgs),

    /// Trend report over samples previously stored by `price`.
    ///
    ///   coinlens report BTC --period 24h
    Report(ReportArgs),
}

#[derive(Debug, Args)]
pub struct PriceArgs {
    /// Ticker symbol (BTC, ETH, SOL).
    pub ticker: String,
}

#[derive(Debug, Args)]
pub struct PeriodArgs {
    /// Ticker symbol (BTC, ETH, SOL).
    pub ticker: String,

    /// Lookback window: 1h, 24h, 7d, 30d, 1y or all.
    #[arg(long, default_value = "7d")]
    pub period: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Ticker symbol (BTC, ETH, SOL).
    pub ticker: String,

    /// Lookback window over stored samples.
    #[arg(long, default_value = "24h")]
    pub period: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["coinlens", "compare", "eth", "--period", "30d", "--pretty"])
            .expect("valid arguments");

        assert!(cli.pretty);
        assert!(!cli.no_store);
        match cli.command {
            Command::Compare(args) => {
                assert_eq!(args.ticker, "eth");
                assert_eq!(args.period, "30d");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn report_defaults_to_one_day() {
        let cli = Cli::try_parse_from(["coinlens", "report", "BTC"]).expect("valid arguments");
        match cli.command {
            Command::Report(args) => assert_eq!(args.period, "24h"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ticker_is_required() {
        assert!(Cli::try_parse_from(["coinlens", "price"]).is_err());
    }
}
