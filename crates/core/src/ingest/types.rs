use serde::{Deserialize, Serialize};

/// Quote data for one instrument as reported by the market-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveQuote {
    pub price: f64,
    pub previous_close: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub volume: u64,
    /// (unix seconds, close) pairs, oldest first. Null closes are dropped.
    pub series: Vec<(i64, f64)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartEnvelope {
    pub chart: Chart,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub indicators: Option<ChartIndicators>,
}

/// Quote metadata. The source reports some values under more than one key
/// depending on the requested range, so each spelling is kept and resolved later.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub regular_market_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub chart_previous_close: Option<f64>,
    pub day_high: Option<f64>,
    pub regular_market_day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub regular_market_day_low: Option<f64>,
    pub regular_market_volume: Option<f64>,
}

impl ChartMeta {
    pub fn previous_close(&self) -> Option<f64> {
        self.previous_close.or(self.chart_previous_close)
    }

    pub fn day_high(&self) -> Option<f64> {
        self.day_high.or(self.regular_market_day_high)
    }

    pub fn day_low(&self) -> Option<f64> {
        self.day_low.or(self.regular_market_day_low)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartQuote {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}
