use crate::domain::recommendation::RecommendationResult;
use crate::feed::indices::REFERENCE_SYMBOL;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionBusy;

impl fmt::Display for PredictionBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a prediction is already in flight")
    }
}

impl std::error::Error for PredictionBusy {}

/// Proof that a prediction was started; returned to [`DashboardSession::finish_prediction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionTicket {
    pub symbol: String,
    generation: u64,
}

/// Viewer state next to the feed: which instrument is selected and the
/// recommendation shown for it.
#[derive(Debug, Clone)]
pub struct DashboardSession {
    selected: String,
    recommendation: Option<RecommendationResult>,
    predicting: bool,
    // Bumped on every selection change so late results for an old selection are dropped.
    generation: u64,
}

impl Default for DashboardSession {
    fn default() -> Self {
        Self::new(REFERENCE_SYMBOL)
    }
}

impl DashboardSession {
    pub fn new(selected: impl Into<String>) -> Self {
        Self {
            selected: selected.into(),
            recommendation: None,
            predicting: false,
            generation: 0,
        }
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn recommendation(&self) -> Option<&RecommendationResult> {
        self.recommendation.as_ref()
    }

    pub fn is_predicting(&self) -> bool {
        self.predicting
    }

    /// Selects `symbol`. A change of selection discards the current recommendation.
    /// Returns whether the selection changed.
    pub fn select(&mut self, symbol: &str) -> bool {
        if self.selected == symbol {
            return false;
        }
        self.selected = symbol.to_string();
        self.recommendation = None;
        self.generation += 1;
        true
    }

    pub fn begin_prediction(&mut self) -> Result<PredictionTicket, PredictionBusy> {
        if self.predicting {
            return Err(PredictionBusy);
        }
        self.predicting = true;
        Ok(PredictionTicket {
            symbol: self.selected.clone(),
            generation: self.generation,
        })
    }

    /// Clears the in-flight flag and stores `result` if the selection is still
    /// the one the prediction was started for. Returns whether it was stored.
    pub fn finish_prediction(&mut self, ticket: PredictionTicket, result: RecommendationResult) -> bool {
        self.predicting = false;
        if ticket.generation != self.generation {
            tracing::debug!(
                symbol = %ticket.symbol,
                selected = %self.selected,
                "discarding recommendation for previous selection"
            );
            return false;
        }
        self.recommendation = Some(result);
        true
    }

    /// Clears the in-flight flag without storing anything.
    pub fn abandon_prediction(&mut self, ticket: PredictionTicket) {
        tracing::debug!(symbol = %ticket.symbol, "prediction abandoned");
        self.predicting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::Instrument;

    fn result_for(symbol: &str) -> RecommendationResult {
        RecommendationResult::fallback(&Instrument::priced(symbol, symbol, 100.0))
    }

    #[test]
    fn defaults_to_reference_symbol() {
        let session = DashboardSession::default();
        assert_eq!(session.selected(), "RELIANCE");
        assert!(session.recommendation().is_none());
    }

    #[test]
    fn selecting_another_symbol_discards_recommendation() {
        let mut session = DashboardSession::default();
        let ticket = session.begin_prediction().unwrap();
        assert!(session.finish_prediction(ticket, result_for("RELIANCE")));
        assert!(session.recommendation().is_some());

        assert!(!session.select("RELIANCE"));
        assert!(session.recommendation().is_some());

        assert!(session.select("TCS"));
        assert!(session.recommendation().is_none());
    }

    #[test]
    fn overlapping_predictions_are_rejected() {
        let mut session = DashboardSession::default();
        let ticket = session.begin_prediction().unwrap();
        assert_eq!(session.begin_prediction(), Err(PredictionBusy));
        assert!(session.is_predicting());

        session.finish_prediction(ticket, result_for("RELIANCE"));
        assert!(!session.is_predicting());
        assert!(session.begin_prediction().is_ok());
    }

    #[test]
    fn abandoned_prediction_frees_the_slot() {
        let mut session = DashboardSession::default();
        let ticket = session.begin_prediction().unwrap();
        session.abandon_prediction(ticket);
        assert!(!session.is_predicting());
        assert!(session.recommendation().is_none());
    }

    #[test]
    fn late_result_for_old_selection_is_dropped() {
        let mut session = DashboardSession::default();
        let ticket = session.begin_prediction().unwrap();
        session.select("INFY");

        assert!(!session.finish_prediction(ticket, result_for("RELIANCE")));
        assert!(session.recommendation().is_none());
        assert!(!session.is_predicting());
    }
}
