use crate::domain::instrument::{HistoryAxis, HistorySample, Instrument};
use crate::domain::round2;
use crate::time::nse_market;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MIN_PRICE: f64 = 0.01;
const OPEN_PRICE_MIN: f64 = 1000.0;
const OPEN_PRICE_MAX: f64 = 3000.0;
// Per-sample spread of the synthetic intraday backfill.
const BACKFILL_STEP_MAX: f64 = 5.0;
const VOLUME_STEP_MAX: u64 = 5_000;

/// Random-walk price generator. Seeded runs are fully reproducible.
#[derive(Debug)]
pub struct Simulator {
    rng: StdRng,
    volatility: f64,
    history_cap: usize,
}

impl Simulator {
    pub fn new(volatility: f64, history_cap: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            volatility: volatility.abs(),
            history_cap,
        }
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    /// Gives an unpriced instrument an opening price and a synthetic intraday
    /// history of `backfill_len` samples trending up to that price.
    /// Instruments that already have a price are left untouched.
    pub fn open(&mut self, instrument: &mut Instrument, backfill_len: usize) {
        if instrument.is_priced() {
            return;
        }

        let base = round2(self.rng.gen_range(OPEN_PRICE_MIN..OPEN_PRICE_MAX));
        instrument.price = base;
        instrument.reference_price = base;
        instrument.high = base;
        instrument.low = base;
        instrument.change = 0.0;
        instrument.change_percent = 0.0;

        self.backfill(instrument, backfill_len);
    }

    /// Replaces the history with `backfill_len` synthetic intraday samples
    /// trending up to the current price.
    pub fn backfill(&mut self, instrument: &mut Instrument, backfill_len: usize) {
        let anchor = instrument.price;
        let samples: Vec<_> = (0..backfill_len)
            .map(|i| {
                let steps_back = (backfill_len - i) as f64;
                let price = anchor - steps_back * self.rng.gen_range(0.0..BACKFILL_STEP_MAX);
                HistorySample::new(nse_market::backfill_label(i), round2(price.max(MIN_PRICE)))
            })
            .collect();
        instrument.replace_history(HistoryAxis::Intraday, samples, self.history_cap);
    }

    /// Uniform drift in `[-volatility * price, volatility * price]`.
    pub fn drift(&mut self, price: f64) -> f64 {
        let bound = self.volatility * price;
        if bound <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-bound..=bound)
    }

    /// Advances one instrument by a single simulated sample labelled `label`.
    pub fn step(&mut self, instrument: &mut Instrument, label: String) {
        let old = instrument.price;
        let new = round2((old + self.drift(old)).max(MIN_PRICE));

        let reference = if instrument.reference_price > 0.0 {
            instrument.reference_price
        } else {
            instrument.reference_price = old;
            old
        };

        instrument.price = new;
        instrument.change = round2(new - reference);
        instrument.change_percent = if reference > 0.0 {
            round2(instrument.change / reference * 100.0)
        } else {
            0.0
        };

        instrument.high = instrument.high.max(new);
        instrument.low = if instrument.low > 0.0 {
            instrument.low.min(new)
        } else {
            new
        };
        instrument.volume = instrument
            .volume
            .saturating_add(self.rng.gen_range(0..VOLUME_STEP_MAX));

        instrument.push_sample(HistorySample::new(label, new), self.history_cap);
    }
}
