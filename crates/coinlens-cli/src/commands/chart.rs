use coinlens_core::{Aggregator, Period, Ticker};

use crate::cli::PeriodArgs;
use crate::error::CliError;

use super::CommandResult;

/// Numeric overlay only; drawing it is left to whoever consumes the JSON.
pub async fn run(args: &PeriodArgs, aggregator: &Aggregator) -> Result<CommandResult, CliError> {
    let ticker = args.ticker.parse::<Ticker>()?;
    let period = args.period.parse::<Period>()?;
    let overlay = aggregator.chart(ticker, period).await?;
    CommandResult::from_aggregated(overlay)
}
