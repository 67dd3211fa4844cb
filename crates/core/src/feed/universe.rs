use crate::domain::instrument::Instrument;

pub const NSE_UNIVERSE: [(&str, &str); 10] = [
    ("RELIANCE", "Reliance Industries Ltd"),
    ("TCS", "Tata Consultancy Services"),
    ("HDFCBANK", "HDFC Bank Ltd"),
    ("INFY", "Infosys Ltd"),
    ("ICICIBANK", "ICICI Bank Ltd"),
    ("HINDUNILVR", "Hindustan Unilever Ltd"),
    ("SBIN", "State Bank of India"),
    ("BHARTIARTL", "Bharti Airtel Ltd"),
    ("ITC", "ITC Ltd"),
    ("KOTAKBANK", "Kotak Mahindra Bank Ltd"),
];

/// Unpriced placeholders for the default watchlist.
pub fn default_universe() -> Vec<Instrument> {
    NSE_UNIVERSE
        .iter()
        .map(|(symbol, name)| Instrument::new(*symbol, *name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn symbols_are_unique() {
        let symbols: HashSet<_> = default_universe()
            .iter()
            .map(|i| i.symbol().to_string())
            .collect();
        assert_eq!(symbols.len(), NSE_UNIVERSE.len());
        assert!(symbols.contains("RELIANCE"));
    }
}
