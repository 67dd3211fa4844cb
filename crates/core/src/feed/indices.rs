use crate::domain::instrument::Instrument;
use crate::domain::market::MarketIndex;
use crate::domain::round2;

/// Instrument whose price drives both headline indices.
pub const REFERENCE_SYMBOL: &str = "RELIANCE";
const FALLBACK_REFERENCE: f64 = 22_000.0;

const NIFTY_BASE: f64 = 22_000.0;
const NIFTY_SPREAD: f64 = 100.0;
const SENSEX_BASE: f64 = 72_500.0;
const SENSEX_SPREAD: f64 = 300.0;

/// Derives NIFTY 50 and SENSEX from the reference instrument's price as
/// `base + (price mod spread)`. The same price always yields the same indices.
pub fn derive_indices(instruments: &[Instrument]) -> Vec<MarketIndex> {
    let reference = instruments
        .iter()
        .find(|i| i.symbol() == REFERENCE_SYMBOL)
        .map(|i| i.price)
        .filter(|p| *p > 0.0)
        .unwrap_or(FALLBACK_REFERENCE);

    vec![
        MarketIndex {
            name: "NIFTY 50".to_string(),
            value: round2(NIFTY_BASE + reference % NIFTY_SPREAD),
            change: 12.4,
            change_percent: 0.05,
        },
        MarketIndex {
            name: "SENSEX".to_string(),
            value: round2(SENSEX_BASE + reference % SENSEX_SPREAD),
            change: -45.2,
            change_percent: -0.06,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_reference_price() {
        let instruments = vec![
            Instrument::priced("TCS", "Tata Consultancy Services", 3999.0),
            Instrument::priced(REFERENCE_SYMBOL, "Reliance Industries Ltd", 2950.5),
        ];
        let idx = derive_indices(&instruments);
        assert_eq!(idx[0].name, "NIFTY 50");
        assert_eq!(idx[0].value, 22_050.5);
        assert_eq!(idx[1].name, "SENSEX");
        assert_eq!(idx[1].value, 72_750.5);
    }

    #[test]
    fn missing_or_unpriced_reference_uses_fallback() {
        let unpriced = vec![Instrument::new(REFERENCE_SYMBOL, "Reliance Industries Ltd")];
        assert_eq!(derive_indices(&unpriced)[0].value, NIFTY_BASE);
        assert_eq!(derive_indices(&[])[1].value, SENSEX_BASE + FALLBACK_REFERENCE % SENSEX_SPREAD);
    }

    #[test]
    fn derivation_is_deterministic() {
        let instruments = vec![Instrument::priced(REFERENCE_SYMBOL, "Reliance", 2501.25)];
        assert_eq!(derive_indices(&instruments), derive_indices(&instruments));
    }
}
