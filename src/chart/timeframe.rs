use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Chart window with its lookback and point budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1m")]
    Month,
    #[serde(rename = "1y")]
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::Hour,
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Hour => "1h",
            Timeframe::Day => "1d",
            Timeframe::Week => "1w",
            Timeframe::Month => "1m",
            Timeframe::Year => "1y",
        }
    }

    /// Lookback in seconds.
    pub fn window_secs(&self) -> i64 {
        match self {
            Timeframe::Hour => 3_600,
            Timeframe::Day => 86_400,
            Timeframe::Week => 604_800,
            Timeframe::Month => 2_592_000,
            Timeframe::Year => 31_536_000,
        }
    }

    pub fn max_points(&self) -> usize {
        match self {
            Timeframe::Hour => 60,
            Timeframe::Day => 96,
            Timeframe::Week => 168,
            Timeframe::Month => 120,
            Timeframe::Year => 365,
        }
    }

    /// Point budget for a caller-supplied limit; `0` means no limit.
    pub fn effective_max_points(&self, limit: usize) -> usize {
        match limit {
            0 => self.max_points(),
            limit => limit.min(self.max_points()),
        }
    }

    /// Short views keep recent data dense when sampled.
    pub fn is_short(&self) -> bool {
        *self <= Timeframe::Week
    }

    pub fn drops_flat_runs(&self) -> bool {
        *self >= Timeframe::Week
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" | "60m" | "hour" => Ok(Timeframe::Hour),
            "1d" | "24h" | "day" => Ok(Timeframe::Day),
            "1w" | "7d" | "week" => Ok(Timeframe::Week),
            "1m" | "30d" | "month" => Ok(Timeframe::Month),
            "1y" | "365d" | "year" => Ok(Timeframe::Year),
            _ => Err(EngineError::UnknownTimeframe(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_aliases() {
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::Hour);
        assert_eq!(" 24H ".parse::<Timeframe>().unwrap(), Timeframe::Day);
        assert_eq!("week".parse::<Timeframe>().unwrap(), Timeframe::Week);
        assert_eq!("30d".parse::<Timeframe>().unwrap(), Timeframe::Month);
        assert_eq!("1Y".parse::<Timeframe>().unwrap(), Timeframe::Year);

        assert_eq!(
            "5m".parse::<Timeframe>(),
            Err(EngineError::UnknownTimeframe("5m".to_string()))
        );
    }

    #[test]
    fn test_table() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert_eq!(Timeframe::Month.window_secs(), 30 * 86_400);
        assert_eq!(Timeframe::Week.effective_max_points(0), 168);
        assert_eq!(Timeframe::Week.effective_max_points(50), 50);
        assert_eq!(Timeframe::Hour.effective_max_points(500), 60);

        assert!(Timeframe::Week.is_short() && !Timeframe::Month.is_short());
        assert!(!Timeframe::Day.drops_flat_runs() && Timeframe::Week.drops_flat_runs());
    }
}
