use coinlens_core::{Aggregator, Period, Ticker};

use crate::cli::PeriodArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &PeriodArgs, aggregator: &Aggregator) -> Result<CommandResult, CliError> {
    let ticker = args.ticker.parse::<Ticker>()?;
    let period = args.period.parse::<Period>()?;
    let comparison = aggregator.compare(ticker, period).await?;
    CommandResult::from_aggregated(comparison)
}
