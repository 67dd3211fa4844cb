use crate::domain::instrument::Instrument;
use crate::domain::recommendation::{
    expected_roi, Action, Citation, RecommendationResult, Sentiment,
};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Shape the model is asked to return. Everything except `sources` and
/// `expectedRoi` comes from the model; those two are filled in locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRecommendation {
    pub symbol: String,
    pub recommendation: Action,
    pub confidence: f64,
    pub target_price: f64,
    pub reasoning: String,
    pub sentiment: Sentiment,
    pub key_factors: Vec<String>,
}

impl LlmRecommendation {
    pub fn validate_and_into_result(
        self,
        instrument: &Instrument,
        sources: Vec<Citation>,
    ) -> anyhow::Result<RecommendationResult> {
        ensure!(
            (0.0..=100.0).contains(&self.confidence),
            "confidence must be between 0 and 100 (got {})",
            self.confidence
        );
        ensure!(
            self.target_price.is_finite() && self.target_price > 0.0,
            "target price must be positive (got {})",
            self.target_price
        );

        let reasoning = self.reasoning.trim().to_string();
        ensure!(!reasoning.is_empty(), "reasoning must be non-empty");

        // The model occasionally echoes a suffixed ticker (RELIANCE.NS); the
        // caller's symbol is authoritative.
        let returned = self.symbol.trim();
        if !returned.is_empty() && !returned.eq_ignore_ascii_case(instrument.symbol()) {
            tracing::debug!(
                expected = instrument.symbol(),
                returned,
                "recommendation symbol differs from request"
            );
        }

        let key_factors = self
            .key_factors
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(RecommendationResult {
            symbol: instrument.symbol().to_string(),
            recommendation: self.recommendation,
            confidence: self.confidence,
            target_price: self.target_price,
            reasoning,
            sentiment: self.sentiment,
            key_factors,
            sources,
            expected_roi: expected_roi(instrument.price, self.target_price),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reliance() -> Instrument {
        Instrument::priced("RELIANCE", "Reliance Industries Ltd", 2500.0)
    }

    #[test]
    fn computes_expected_roi_locally() {
        let raw = json!({
            "symbol": "RELIANCE",
            "recommendation": "BUY",
            "confidence": 72,
            "targetPrice": 2750.0,
            "reasoning": "  Strong refining margins  ",
            "sentiment": "BULLISH",
            "keyFactors": ["Jio growth", " ", "Retail expansion"]
        });
        let parsed: LlmRecommendation = serde_json::from_value(raw).unwrap();
        let res = parsed.validate_and_into_result(&reliance(), Vec::new()).unwrap();

        assert_eq!(res.recommendation, Action::Buy);
        assert_eq!(res.expected_roi, 10.0);
        assert_eq!(res.reasoning, "Strong refining margins");
        assert_eq!(res.key_factors, vec!["Jio growth", "Retail expansion"]);
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let raw = json!({
            "symbol": "RELIANCE",
            "recommendation": "SELL",
            "confidence": 140,
            "targetPrice": 2300.0,
            "reasoning": "x",
            "sentiment": "BEARISH",
            "keyFactors": []
        });
        let parsed: LlmRecommendation = serde_json::from_value(raw).unwrap();
        assert!(parsed.validate_and_into_result(&reliance(), Vec::new()).is_err());
    }

    #[test]
    fn rejects_unknown_action() {
        let raw = json!({
            "symbol": "RELIANCE",
            "recommendation": "ACCUMULATE",
            "confidence": 60,
            "targetPrice": 2600.0,
            "reasoning": "x",
            "sentiment": "BULLISH",
            "keyFactors": []
        });
        assert!(serde_json::from_value::<LlmRecommendation>(raw).is_err());
    }
}
