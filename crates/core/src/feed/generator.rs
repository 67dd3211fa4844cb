use crate::config::FeedConfig;
use crate::domain::instrument::{HistoryAxis, HistorySample, Instrument};
use crate::domain::market::{FeedMode, Snapshot};
use crate::domain::round2;
use crate::feed::indices::derive_indices;
use crate::feed::simulate::Simulator;
use crate::ingest::provider::{FailureKind, QuoteFailure, QuoteOutcome, QuoteSource};
use crate::ingest::types::LiveQuote;
use crate::time::nse_market;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub live: usize,
    pub simulated: usize,
    /// Live-mode fetches that failed and were replaced by a simulated step.
    pub fallbacks: usize,
}

/// Owns the tracked instruments and advances them one sample per tick.
pub struct FeedGenerator {
    instruments: Vec<Instrument>,
    simulator: Simulator,
    mode: FeedMode,
    source: Option<Arc<dyn QuoteSource>>,
    fetch_timeout: Duration,
    history_cap: usize,
    backfill_len: usize,
    ticks: u64,
}

impl FeedGenerator {
    pub fn new(
        mut instruments: Vec<Instrument>,
        config: &FeedConfig,
        source: Option<Arc<dyn QuoteSource>>,
    ) -> Self {
        let mut simulator = Simulator::new(config.volatility, config.history_cap, config.seed);
        for inst in &mut instruments {
            simulator.open(inst, config.backfill_len);
        }

        Self {
            instruments,
            simulator,
            mode: config.initial_mode,
            source,
            fetch_timeout: config.fetch_timeout,
            history_cap: config.history_cap,
            backfill_len: config.backfill_len,
            ticks: 0,
        }
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FeedMode) {
        self.mode = mode;
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advances every instrument by one sample. Never fails: in live mode each
    /// instrument whose quote is unavailable takes a simulated step instead.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let label = nse_market::sample_label(now);
        let mut report = TickReport::default();

        match self.mode {
            FeedMode::Simulated => {
                for inst in &mut self.instruments {
                    simulated_step(&mut self.simulator, inst, label.clone(), self.backfill_len);
                }
                report.simulated = self.instruments.len();
            }
            FeedMode::Live => {
                let outcomes = self.fetch_all().await;
                for (inst, outcome) in self.instruments.iter_mut().zip(outcomes) {
                    match outcome {
                        QuoteOutcome::Live(quote) => {
                            apply_live(inst, &quote, now, self.history_cap);
                            report.live += 1;
                        }
                        QuoteOutcome::Unavailable(failure) => {
                            tracing::warn!(
                                symbol = %failure.symbol,
                                kind = ?failure.kind,
                                error = %failure.detail,
                                "live quote unavailable; using simulated step"
                            );
                            simulated_step(&mut self.simulator, inst, label.clone(), self.backfill_len);
                            report.simulated += 1;
                            report.fallbacks += 1;
                        }
                    }
                }
            }
        }

        self.ticks += 1;
        tracing::debug!(
            tick = self.ticks,
            mode = %self.mode,
            live = report.live,
            simulated = report.simulated,
            fallbacks = report.fallbacks,
            "feed tick complete"
        );
        report
    }

    /// Fetches quotes for every instrument concurrently, preserving instrument
    /// order in the returned outcomes. Each fetch is bounded by the fetch timeout.
    async fn fetch_all(&self) -> Vec<QuoteOutcome> {
        let symbols: Vec<String> = self
            .instruments
            .iter()
            .map(|i| i.symbol().to_string())
            .collect();

        let Some(source) = self.source.clone() else {
            return symbols
                .iter()
                .map(|s| {
                    QuoteOutcome::Unavailable(QuoteFailure::new(
                        s,
                        FailureKind::Transport,
                        "no market data source configured",
                    ))
                })
                .collect();
        };

        let mut set = JoinSet::new();
        for (idx, symbol) in symbols.iter().cloned().enumerate() {
            let source = Arc::clone(&source);
            let timeout = self.fetch_timeout;
            set.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, source.fetch_quote(&symbol)).await {
                    Ok(outcome) => outcome,
                    Err(_) => QuoteOutcome::Unavailable(QuoteFailure::new(
                        &symbol,
                        FailureKind::Timeout,
                        format!("no response within {timeout:?}"),
                    )),
                };
                (idx, outcome)
            });
        }

        let mut outcomes: Vec<Option<QuoteOutcome>> = vec![None; symbols.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(err) => tracing::warn!(error = %err, "quote fetch task failed"),
            }
        }

        outcomes
            .into_iter()
            .zip(&symbols)
            .map(|(outcome, symbol)| {
                outcome.unwrap_or_else(|| {
                    QuoteOutcome::Unavailable(QuoteFailure::new(
                        symbol,
                        FailureKind::Transport,
                        "quote fetch task aborted",
                    ))
                })
            })
            .collect()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            sequence: self.ticks,
            taken_at: now,
            mode: self.mode,
            session: nse_market::session_at(now),
            instruments: self.instruments.clone(),
            indices: derive_indices(&self.instruments),
        }
    }
}

/// One simulated sample. Daily bars left by an earlier live quote are swapped
/// for an intraday backfill first, so a history never mixes the two axes.
fn simulated_step(sim: &mut Simulator, inst: &mut Instrument, label: String, backfill_len: usize) {
    if inst.history_axis() == HistoryAxis::Daily {
        sim.backfill(inst, backfill_len);
    }
    sim.step(inst, label);
}

fn apply_live(inst: &mut Instrument, quote: &LiveQuote, now: DateTime<Utc>, history_cap: usize) {
    let change = round2(quote.price - quote.previous_close);

    inst.price = round2(quote.price);
    inst.change = change;
    inst.change_percent = round2(change / quote.previous_close * 100.0);
    inst.reference_price = quote.previous_close;
    inst.volume = quote.volume;
    inst.high = quote.day_high;
    inst.low = quote.day_low;

    let series: Vec<HistorySample> = quote
        .series
        .iter()
        .filter_map(|(ts, close)| {
            nse_market::daily_label(*ts).map(|time| HistorySample::new(time, round2(*close)))
        })
        .collect();

    if !series.is_empty() {
        inst.replace_history(HistoryAxis::Daily, series, history_cap);
        return;
    }

    // No bars in the payload: extend the current axis with today's price.
    let label = match inst.history_axis() {
        HistoryAxis::Daily => nse_market::daily_label(now.timestamp()),
        HistoryAxis::Intraday => Some(nse_market::sample_label(now)),
    };
    if let Some(label) = label {
        inst.push_sample(HistorySample::new(label, inst.price), history_cap);
    }
}
