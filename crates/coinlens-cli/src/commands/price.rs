use coinlens_core::{Aggregator, Ticker};

use crate::cli::PriceArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &PriceArgs, aggregator: &Aggregator) -> Result<CommandResult, CliError> {
    let ticker = args.ticker.parse::<Ticker>()?;
    let current = aggregator.current(ticker).await?;
    CommandResult::from_aggregated(current)
}
