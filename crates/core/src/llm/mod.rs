use crate::domain::instrument::Instrument;
use crate::domain::recommendation::RecommendationResult;
use std::sync::Arc;

pub mod error;
pub mod gemini;
pub mod json;

#[derive(Debug, Clone)]
pub enum Provider {
    Gemini,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn recommend(&self, instrument: &Instrument) -> anyhow::Result<RecommendationResult>;
}

/// Front door for recommendations. Callers always get a value: any client
/// failure, or a missing client, yields [`RecommendationResult::fallback`].
#[derive(Clone)]
pub struct Recommender {
    client: Option<Arc<dyn LlmClient>>,
}

impl Recommender {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn recommend(&self, instrument: &Instrument) -> RecommendationResult {
        let Some(client) = &self.client else {
            tracing::warn!(symbol = instrument.symbol(), "no recommendation client configured");
            return RecommendationResult::fallback(instrument);
        };

        match client.recommend(instrument).await {
            Ok(result) => {
                tracing::info!(
                    symbol = instrument.symbol(),
                    provider = ?client.provider(),
                    recommendation = ?result.recommendation,
                    confidence = result.confidence,
                    "recommendation generated"
                );
                result
            }
            Err(err) => {
                if let Some(diag) = err.downcast_ref::<error::LlmDiagnosticsError>() {
                    tracing::warn!(
                        symbol = instrument.symbol(),
                        stage = diag.stage.as_str(),
                        raw_output = diag.raw_output.as_deref().unwrap_or(""),
                        "recommendation diagnostics"
                    );
                }
                tracing::warn!(
                    symbol = instrument.symbol(),
                    error = %format!("{err:#}"),
                    "recommendation failed; returning neutral default"
                );
                RecommendationResult::fallback(instrument)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::{Action, Sentiment};

    struct FailingClient;

    #[async_trait::async_trait]
    impl LlmClient for FailingClient {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn recommend(&self, _instrument: &Instrument) -> anyhow::Result<RecommendationResult> {
            Err(error::LlmDiagnosticsError::new(
                Provider::Gemini,
                error::Stage::Http,
                "status=429 Too Many Requests",
            )
            .with_raw_output("{\"error\":{\"code\":429}}")
            .into())
        }
    }

    struct BuyClient;

    #[async_trait::async_trait]
    impl LlmClient for BuyClient {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn recommend(&self, instrument: &Instrument) -> anyhow::Result<RecommendationResult> {
            let mut res = RecommendationResult::fallback(instrument);
            res.recommendation = Action::Buy;
            res.sentiment = Sentiment::Bullish;
            Ok(res)
        }
    }

    #[tokio::test]
    async fn upstream_failure_yields_neutral_default() {
        let inst = Instrument::priced("ICICIBANK", "ICICI Bank Ltd", 1234.5);
        let res = Recommender::new(Arc::new(FailingClient)).recommend(&inst).await;

        assert_eq!(res.recommendation, Action::Hold);
        assert_eq!(res.confidence, 50.0);
        assert_eq!(res.target_price, 1234.5);
        assert_eq!(res.expected_roi, 0.0);
    }

    #[tokio::test]
    async fn disabled_recommender_yields_default() {
        let inst = Instrument::priced("ITC", "ITC Ltd", 430.0);
        let recommender = Recommender::disabled();
        assert!(!recommender.is_enabled());
        assert_eq!(recommender.recommend(&inst).await.recommendation, Action::Hold);
    }

    #[tokio::test]
    async fn successful_result_passes_through() {
        let inst = Instrument::priced("ITC", "ITC Ltd", 430.0);
        let res = Recommender::new(Arc::new(BuyClient)).recommend(&inst).await;
        assert_eq!(res.recommendation, Action::Buy);
    }
}
