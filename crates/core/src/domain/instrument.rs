use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub time: String,
    pub price: f64,
}

impl HistorySample {
    pub fn new(time: impl Into<String>, price: f64) -> Self {
        Self {
            time: time.into(),
            price: price.max(0.0),
        }
    }
}

/// Time axis of an instrument's history: intraday wall-clock samples, or
/// daily bars taken from a live quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAxis {
    #[default]
    Intraday,
    Daily,
}

/// A tracked equity. `symbol` is fixed at construction; history is only grown
/// through [`Instrument::push_sample`] so the cap is always honoured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    symbol: String,
    pub company_name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub high: f64,
    pub low: f64,
    /// Price that `change` is measured against (session open, or previous close
    /// once a live quote has been applied).
    pub reference_price: f64,
    #[serde(default)]
    history_axis: HistoryAxis,
    history: VecDeque<HistorySample>,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            company_name: company_name.into(),
            price: 0.0,
            change: 0.0,
            change_percent: 0.0,
            volume: 0,
            high: 0.0,
            low: 0.0,
            reference_price: 0.0,
            history_axis: HistoryAxis::Intraday,
            history: VecDeque::new(),
        }
    }

    /// An instrument opened at `price`, with no movement yet.
    pub fn priced(symbol: impl Into<String>, company_name: impl Into<String>, price: f64) -> Self {
        let mut out = Self::new(symbol, company_name);
        out.price = price;
        out.high = price;
        out.low = price;
        out.reference_price = price;
        out
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_priced(&self) -> bool {
        self.price > 0.0
    }

    pub fn history(&self) -> impl ExactSizeIterator<Item = &HistorySample> + '_ {
        self.history.iter()
    }

    pub fn history_axis(&self) -> HistoryAxis {
        self.history_axis
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_sample(&self) -> Option<&HistorySample> {
        self.history.back()
    }

    /// Appends a sample, evicting from the front until at most `cap` remain.
    pub fn push_sample(&mut self, sample: HistorySample, cap: usize) {
        self.history.push_back(sample);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }

    /// Replaces the whole history, keeping only the newest `cap` samples.
    pub fn replace_history(
        &mut self,
        axis: HistoryAxis,
        samples: impl IntoIterator<Item = HistorySample>,
        cap: usize,
    ) {
        self.history_axis = axis;
        self.history.clear();
        for sample in samples {
            self.push_sample(sample, cap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_sample_evicts_oldest_first() {
        let mut inst = Instrument::priced("TCS", "Tata Consultancy Services", 3500.0);
        for i in 0..5 {
            inst.push_sample(HistorySample::new(format!("t{i}"), 3500.0 + i as f64), 3);
        }

        let times: Vec<_> = inst.history().map(|s| s.time.as_str()).collect();
        assert_eq!(times, vec!["t2", "t3", "t4"]);
        assert_eq!(inst.last_sample().map(|s| s.price), Some(3504.0));
    }

    #[test]
    fn replace_history_keeps_newest() {
        let mut inst = Instrument::new("ITC", "ITC Ltd");
        let samples = (0..40).map(|i| HistorySample::new(format!("d{i}"), 400.0));
        inst.replace_history(HistoryAxis::Daily, samples, 30);

        assert_eq!(inst.history_len(), 30);
        assert_eq!(inst.history_axis(), HistoryAxis::Daily);
        assert_eq!(inst.history().next().map(|s| s.time.as_str()), Some("d10"));
    }

    #[test]
    fn negative_sample_prices_are_clamped() {
        assert_eq!(HistorySample::new("9:00", -1.0).price, 0.0);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let inst = Instrument::priced("SBIN", "State Bank of India", 780.5);
        let v = serde_json::to_value(&inst).unwrap();
        assert_eq!(v["symbol"], "SBIN");
        assert_eq!(v["companyName"], "State Bank of India");
        assert_eq!(v["changePercent"], 0.0);
        assert_eq!(v["historyAxis"], "intraday");
        assert!(v["history"].as_array().unwrap().is_empty());
    }
}
