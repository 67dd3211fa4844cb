use crate::domain::instrument::Instrument;
use crate::time::nse_market::MarketSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    #[default]
    Simulated,
    Live,
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedMode::Simulated => f.write_str("simulated"),
            FeedMode::Live => f.write_str("live"),
        }
    }
}

impl FromStr for FeedMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" | "fake" => Ok(FeedMode::Simulated),
            "live" | "actual" => Ok(FeedMode::Live),
            other => anyhow::bail!("unknown feed mode: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIndex {
    pub name: String,
    pub value: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Point-in-time copy of everything the feed publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Number of completed ticks when the snapshot was taken.
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub mode: FeedMode,
    pub session: MarketSession,
    pub instruments: Vec<Instrument>,
    pub indices: Vec<MarketIndex>,
}

impl Snapshot {
    pub fn instrument(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments
            .iter()
            .find(|i| i.symbol().eq_ignore_ascii_case(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_aliases() {
        assert_eq!("live".parse::<FeedMode>().unwrap(), FeedMode::Live);
        assert_eq!("ACTUAL".parse::<FeedMode>().unwrap(), FeedMode::Live);
        assert_eq!("fake".parse::<FeedMode>().unwrap(), FeedMode::Simulated);
        assert!("paper".parse::<FeedMode>().is_err());
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(FeedMode::Simulated).unwrap(),
            serde_json::json!("simulated")
        );
    }
}
