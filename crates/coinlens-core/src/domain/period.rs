use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const HOUR: u64 = 3_600;
const DAY: u64 = 24 * HOUR;

/// Supported lookback windows for history and trend requests.
///
/// Each source resolves a period into its own resolution/limit pair; the core
/// only relies on [`Period::lookback`] for filtering stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "all")]
    All,
}

impl Period {
    pub const ALL: [Self; 6] = [
        Self::OneHour,
        Self::OneDay,
        Self::SevenDays,
        Self::ThirtyDays,
        Self::OneYear,
        Self::All,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
            Self::ThirtyDays => "30d",
            Self::OneYear => "1y",
            Self::All => "all",
        }
    }

    /// Length of the window, or `None` for an unbounded lookback.
    pub const fn lookback(self) -> Option<Duration> {
        match self {
            Self::OneHour => Some(Duration::from_secs(HOUR)),
            Self::OneDay => Some(Duration::from_secs(DAY)),
            Self::SevenDays => Some(Duration::from_secs(7 * DAY)),
            Self::ThirtyDays => Some(Duration::from_secs(30 * DAY)),
            Self::OneYear => Some(Duration::from_secs(365 * DAY)),
            Self::All => None,
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(Self::OneHour),
            "24h" | "1d" => Ok(Self::OneDay),
            "7d" => Ok(Self::SevenDays),
            "30d" => Ok(Self::ThirtyDays),
            "1y" | "365d" => Ok(Self::OneYear),
            "all" | "max" => Ok(Self::All),
            other => Err(ValidationError::InvalidPeriod {
                value: other.to_owned(),
            }),
        }
    }
}
