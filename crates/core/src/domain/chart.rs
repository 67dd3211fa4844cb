use crate::domain::instrument::Instrument;
use crate::domain::recommendation::RecommendationResult;
use serde::{Deserialize, Serialize};

pub const NEXT_DAY_LABEL: &str = "+1D (Exp)";
pub const TARGET_LABEL: &str = "Target";

/// A history sample as drawn on the price chart; projection points carry only
/// `predicted_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_price: Option<f64>,
}

pub fn chart_points(
    instrument: &Instrument,
    recommendation: Option<&RecommendationResult>,
) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = instrument
        .history()
        .map(|s| ChartPoint {
            time: s.time.clone(),
            price: Some(s.price),
            predicted_price: None,
        })
        .collect();

    let Some(rec) = recommendation.filter(|r| r.symbol == instrument.symbol()) else {
        return points;
    };

    let last_price = instrument
        .last_sample()
        .map(|s| s.price)
        .unwrap_or(instrument.price);

    points.push(ChartPoint {
        time: NEXT_DAY_LABEL.to_string(),
        price: None,
        predicted_price: Some(last_price),
    });
    points.push(ChartPoint {
        time: TARGET_LABEL.to_string(),
        price: None,
        predicted_price: Some(rec.target_price),
    });
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::HistorySample;

    fn hdfc() -> Instrument {
        let mut inst = Instrument::priced("HDFCBANK", "HDFC Bank Ltd", 1650.0);
        inst.push_sample(HistorySample::new("10:00:00", 1648.0), 30);
        inst.push_sample(HistorySample::new("10:00:05", 1650.0), 30);
        inst
    }

    #[test]
    fn no_projection_without_recommendation() {
        let points = chart_points(&hdfc(), None);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.predicted_price.is_none()));
    }

    #[test]
    fn appends_projection_points() {
        let inst = hdfc();
        let mut rec = RecommendationResult::fallback(&inst);
        rec.target_price = 1800.0;

        let points = chart_points(&inst, Some(&rec));
        assert_eq!(points.len(), 4);
        assert_eq!(points[2].time, NEXT_DAY_LABEL);
        assert_eq!(points[2].predicted_price, Some(1650.0));
        assert_eq!(points[3].time, TARGET_LABEL);
        assert_eq!(points[3].predicted_price, Some(1800.0));
    }

    #[test]
    fn ignores_recommendation_for_other_symbol() {
        let other = Instrument::priced("SBIN", "State Bank of India", 780.0);
        let rec = RecommendationResult::fallback(&other);
        assert_eq!(chart_points(&hdfc(), Some(&rec)).len(), 2);
    }
}
