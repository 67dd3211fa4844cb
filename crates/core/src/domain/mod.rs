pub mod chart;
pub mod contract;
pub mod instrument;
pub mod market;
pub mod recommendation;

/// Rounds to two decimal places (paise precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::round2;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(1500.125), 1500.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(12.3), 12.3);
    }
}
