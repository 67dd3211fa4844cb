pub mod dashboard;
pub mod domain;
pub mod feed;
pub mod ingest;
pub mod llm;
pub mod storage;
pub mod time;

pub mod config {
    use crate::feed::FeedMode;
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_TICK_SECS: u64 = 5;
    const DEFAULT_VOLATILITY: f64 = 0.002;
    const DEFAULT_HISTORY_CAP: usize = 30;
    const DEFAULT_BACKFILL_LEN: usize = 20;
    const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 8;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub gemini_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub preferences_path: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                gemini_api_key: std::env::var("GEMINI_API_KEY")
                    .or_else(|_| std::env::var("API_KEY"))
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                preferences_path: std::env::var("PREFERENCES_PATH").ok(),
            })
        }

        pub fn require_gemini_api_key(&self) -> anyhow::Result<&str> {
            self.gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }
    }

    /// Tunables for the feed service. Injected at construction; the service never
    /// reads the environment itself.
    #[derive(Debug, Clone)]
    pub struct FeedConfig {
        pub tick_period: Duration,
        /// Maximum per-tick drift as a fraction of the current price.
        pub volatility: f64,
        pub history_cap: usize,
        pub backfill_len: usize,
        pub fetch_timeout: Duration,
        pub seed: Option<u64>,
        pub initial_mode: FeedMode,
    }

    impl Default for FeedConfig {
        fn default() -> Self {
            Self {
                tick_period: Duration::from_secs(DEFAULT_TICK_SECS),
                volatility: DEFAULT_VOLATILITY,
                history_cap: DEFAULT_HISTORY_CAP,
                backfill_len: DEFAULT_BACKFILL_LEN,
                fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
                seed: None,
                initial_mode: FeedMode::Simulated,
            }
        }
    }

    impl FeedConfig {
        pub fn from_env() -> Self {
            let defaults = Self::default();

            let tick_period = env_parse::<u64>("FEED_TICK_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.tick_period);

            let volatility = env_parse::<f64>("FEED_VOLATILITY")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(defaults.volatility);

            let history_cap = env_parse::<usize>("FEED_HISTORY_CAP")
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.history_cap);

            let fetch_timeout = env_parse::<u64>("FEED_FETCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout);

            let initial_mode = std::env::var("FEED_MODE")
                .ok()
                .and_then(|s| s.parse::<FeedMode>().ok())
                .unwrap_or(defaults.initial_mode);

            Self {
                tick_period,
                volatility,
                history_cap,
                backfill_len: defaults.backfill_len.min(history_cap),
                fetch_timeout,
                seed: env_parse::<u64>("FEED_SEED"),
                initial_mode,
            }
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }
}
