use crate::config::Settings;
use crate::ingest::types::{ChartEnvelope, LiveQuote};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::fmt;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_INTERVAL: &str = "1d";
const DEFAULT_RANGE: &str = "1mo";
const EXCHANGE_SUFFIX: &str = ".NS";
const CLIENT_USER_AGENT: &str = "Mozilla/5.0 (compatible; nse-feed/0.1)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Timeout,
    Http,
    Decode,
    Schema,
}

#[derive(Debug, Clone)]
pub struct QuoteFailure {
    pub symbol: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl QuoteFailure {
    pub fn new(symbol: &str, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for QuoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quote unavailable (symbol={}, kind={:?}): {}",
            self.symbol, self.kind, self.detail
        )
    }
}

impl std::error::Error for QuoteFailure {}

/// Result of asking the market-data source for one instrument.
#[derive(Debug, Clone)]
pub enum QuoteOutcome {
    Live(LiveQuote),
    Unavailable(QuoteFailure),
}

impl From<Result<LiveQuote, QuoteFailure>> for QuoteOutcome {
    fn from(res: Result<LiveQuote, QuoteFailure>) -> Self {
        match res {
            Ok(quote) => QuoteOutcome::Live(quote),
            Err(failure) => QuoteOutcome::Unavailable(failure),
        }
    }
}

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Never errors: every failure is reported as [`QuoteOutcome::Unavailable`].
    async fn fetch_quote(&self, symbol: &str) -> QuoteOutcome;
}

#[derive(Debug, Clone)]
pub struct YahooChartProvider {
    http: reqwest::Client,
    base_url: String,
    interval: String,
    range: String,
}

impl YahooChartProvider {
    pub fn from_settings(settings: &Settings, timeout: Duration) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let interval = std::env::var("MARKET_DATA_INTERVAL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
        let range = std::env::var("MARKET_DATA_RANGE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RANGE.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            interval,
            range,
        })
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}{}",
            self.base_url.trim_end_matches('/'),
            symbol,
            EXCHANGE_SUFFIX
        )
    }

    async fn fetch_once(&self, symbol: &str) -> Result<LiveQuote, QuoteFailure> {
        let res = self
            .http
            .get(self.url(symbol))
            .query(&[("interval", self.interval.as_str()), ("range", self.range.as_str())])
            .send()
            .await
            .map_err(|err| {
                let kind = if err.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Transport
                };
                QuoteFailure::new(symbol, kind, err.to_string())
            })?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| QuoteFailure::new(symbol, FailureKind::Transport, err.to_string()))?;

        if !status.is_success() {
            return Err(QuoteFailure::new(
                symbol,
                FailureKind::Http,
                format!("HTTP {status}: {}", truncate(&text, 200)),
            ));
        }

        parse_chart(symbol, &text)
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooChartProvider {
    fn source_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_quote(&self, symbol: &str) -> QuoteOutcome {
        self.fetch_once(symbol).await.into()
    }
}

/// Decodes a chart payload into a [`LiveQuote`], rejecting anything that lacks
/// the fields the feed needs.
pub fn parse_chart(symbol: &str, text: &str) -> Result<LiveQuote, QuoteFailure> {
    let envelope = serde_json::from_str::<ChartEnvelope>(text)
        .map_err(|err| QuoteFailure::new(symbol, FailureKind::Decode, err.to_string()))?;

    if let Some(err) = envelope.chart.error.filter(|v| !v.is_null()) {
        return Err(QuoteFailure::new(
            symbol,
            FailureKind::Schema,
            format!("chart error: {err}"),
        ));
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| QuoteFailure::new(symbol, FailureKind::Schema, "empty chart result"))?;

    let meta = &result.meta;
    let missing = |field: &str| QuoteFailure::new(symbol, FailureKind::Schema, format!("missing {field}"));

    let price = meta
        .regular_market_price
        .ok_or_else(|| missing("regularMarketPrice"))?;
    let previous_close = meta.previous_close().ok_or_else(|| missing("previousClose"))?;
    let day_high = meta.day_high().ok_or_else(|| missing("dayHigh"))?;
    let day_low = meta.day_low().ok_or_else(|| missing("dayLow"))?;
    let volume = meta
        .regular_market_volume
        .ok_or_else(|| missing("regularMarketVolume"))?;

    if !(price > 0.0 && previous_close > 0.0) {
        return Err(QuoteFailure::new(
            symbol,
            FailureKind::Schema,
            format!("non-positive price={price} previous_close={previous_close}"),
        ));
    }

    let closes = result
        .indicators
        .as_ref()
        .and_then(|i| i.quote.first())
        .map(|q| q.close.as_slice())
        .unwrap_or_default();

    let series = result
        .timestamp
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| close.map(|c| (*ts, c)))
        .collect();

    Ok(LiveQuote {
        price,
        previous_close,
        day_high,
        day_low,
        volume: volume.max(0.0) as u64,
        series,
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart_payload() -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {
                        "regularMarketPrice": 2950.5,
                        "chartPreviousClose": 2900.0,
                        "regularMarketDayHigh": 2961.0,
                        "regularMarketDayLow": 2890.25,
                        "regularMarketVolume": 5123456
                    },
                    "timestamp": [1767585600, 1767672000, 1767758400],
                    "indicators": {"quote": [{"close": [2880.0, null, 2950.5]}]}
                }],
                "error": null
            }
        })
    }

    #[test]
    fn parses_chart_meta_and_series() {
        let quote = parse_chart("RELIANCE", &chart_payload().to_string()).unwrap();
        assert_eq!(quote.price, 2950.5);
        assert_eq!(quote.previous_close, 2900.0);
        assert_eq!(quote.day_high, 2961.0);
        assert_eq!(quote.day_low, 2890.25);
        assert_eq!(quote.volume, 5_123_456);
        assert_eq!(quote.series, vec![(1767585600, 2880.0), (1767758400, 2950.5)]);
    }

    #[test]
    fn prefers_previous_close_when_both_present() {
        let mut v = chart_payload();
        v["chart"]["result"][0]["meta"]["previousClose"] = json!(2910.0);
        let quote = parse_chart("RELIANCE", &v.to_string()).unwrap();
        assert_eq!(quote.previous_close, 2910.0);
    }

    #[test]
    fn missing_meta_field_is_schema_failure() {
        let mut v = chart_payload();
        v["chart"]["result"][0]["meta"]
            .as_object_mut()
            .unwrap()
            .remove("regularMarketPrice");
        let err = parse_chart("RELIANCE", &v.to_string()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Schema);
        assert!(err.detail.contains("regularMarketPrice"));
    }

    #[test]
    fn chart_error_is_schema_failure() {
        let v = json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found"}
            }
        });
        let err = parse_chart("NOPE", &v.to_string()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Schema);
    }

    #[test]
    fn non_json_is_decode_failure() {
        let err = parse_chart("TCS", "<html>blocked</html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::Decode);
    }

    #[test]
    fn builds_exchange_suffixed_url() {
        let settings = Settings {
            gemini_api_key: None,
            sentry_dsn: None,
            market_data_base_url: Some("http://localhost:9000/".to_string()),
            preferences_path: None,
        };
        let provider = YahooChartProvider::from_settings(&settings, Duration::from_secs(1)).unwrap();
        assert_eq!(
            provider.url("INFY"),
            "http://localhost:9000/v8/finance/chart/INFY.NS"
        );
    }
}
