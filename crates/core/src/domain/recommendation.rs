use crate::domain::instrument::Instrument;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub symbol: String,
    pub recommendation: Action,
    pub confidence: f64,
    pub target_price: f64,
    pub reasoning: String,
    pub sentiment: Sentiment,
    pub key_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Citation>,
    pub expected_roi: f64,
}

impl RecommendationResult {
    /// Neutral result handed out whenever the recommendation source fails.
    pub fn fallback(instrument: &Instrument) -> Self {
        Self {
            symbol: instrument.symbol().to_string(),
            recommendation: Action::Hold,
            confidence: 50.0,
            target_price: instrument.price,
            reasoning: "Unable to fetch real-time prediction. Please try again.".to_string(),
            sentiment: Sentiment::Neutral,
            key_factors: vec![
                "API connectivity check".to_string(),
                "Market volatility".to_string(),
            ],
            sources: Vec::new(),
            expected_roi: 0.0,
        }
    }
}

/// Percentage return from `current` to `target`. Zero when there is no current price.
pub fn expected_roi(current: f64, target: f64) -> f64 {
    if current <= 0.0 {
        return 0.0;
    }
    (target - current) / current * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_is_relative_to_current() {
        assert_eq!(expected_roi(100.0, 110.0), 10.0);
        assert_eq!(expected_roi(200.0, 150.0), -25.0);
        assert_eq!(expected_roi(0.0, 150.0), 0.0);
    }

    #[test]
    fn fallback_is_neutral_hold_at_current_price() {
        let inst = Instrument::priced("INFY", "Infosys Ltd", 1620.4);
        let res = RecommendationResult::fallback(&inst);
        assert_eq!(res.recommendation, Action::Hold);
        assert_eq!(res.confidence, 50.0);
        assert_eq!(res.target_price, 1620.4);
        assert_eq!(res.expected_roi, 0.0);
        assert_eq!(res.sentiment, Sentiment::Neutral);
        assert_eq!(res.symbol, "INFY");
    }

    #[test]
    fn serializes_enums_uppercase() {
        let inst = Instrument::priced("ITC", "ITC Ltd", 430.0);
        let v = serde_json::to_value(RecommendationResult::fallback(&inst)).unwrap();
        assert_eq!(v["recommendation"], "HOLD");
        assert_eq!(v["sentiment"], "NEUTRAL");
        assert_eq!(v["targetPrice"], 430.0);
        assert!(v.get("sources").is_none());
    }
}
