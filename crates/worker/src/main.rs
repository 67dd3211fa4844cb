use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nse_feed_core::domain::market::FeedMode;
use nse_feed_core::feed::FeedService;
use nse_feed_core::ingest::provider::{QuoteSource, YahooChartProvider};
use nse_feed_core::llm::gemini::GeminiClient;
use nse_feed_core::llm::Recommender;

#[derive(Debug, Parser)]
#[command(name = "nse_feed_worker")]
struct Args {
    /// Number of published snapshots to log before stopping.
    #[arg(long, default_value_t = 3)]
    ticks: u32,

    /// Data source: `simulated` or `live`. Defaults to FEED_MODE, then simulated.
    #[arg(long)]
    mode: Option<String>,

    /// Seed for the random walk, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// After the ticks, request a recommendation for this symbol and print it as JSON.
    #[arg(long)]
    predict: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = nse_feed_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let mut config = nse_feed_core::config::FeedConfig::from_env();
    if let Some(mode) = args.mode.as_deref() {
        config.initial_mode = mode.parse::<FeedMode>()?;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let source: Option<Arc<dyn QuoteSource>> = if config.initial_mode == FeedMode::Live {
        Some(Arc::new(YahooChartProvider::from_settings(
            &settings,
            config.fetch_timeout,
        )?))
    } else {
        None
    };

    let (feed, feed_task) = FeedService::spawn(
        nse_feed_core::feed::universe::default_universe(),
        config,
        source,
    );

    let (subscription, mut snapshots) = feed.subscribe_channel().await?;
    // Drop the subscription-time snapshot; only ticks are counted.
    let _ = snapshots.recv().await;

    feed.start().await?;

    let mut latest = None;
    for _ in 0..args.ticks {
        let Some(snapshot) = snapshots.recv().await else {
            anyhow::bail!("feed closed before {} ticks were published", args.ticks);
        };
        for instrument in &snapshot.instruments {
            tracing::info!(
                sequence = snapshot.sequence,
                symbol = instrument.symbol(),
                price = instrument.price,
                change_percent = instrument.change_percent,
                "tick"
            );
        }
        for index in &snapshot.indices {
            tracing::info!(
                sequence = snapshot.sequence,
                index = %index.name,
                value = index.value,
                "index"
            );
        }
        latest = Some(snapshot);
    }

    feed.stop().await?;
    feed.unsubscribe(subscription).await?;

    if let Some(symbol) = args.predict.as_deref() {
        let snapshot = match latest {
            Some(snapshot) => snapshot,
            None => feed.snapshot().await?,
        };
        let Some(instrument) = snapshot.instrument(symbol) else {
            anyhow::bail!("unknown symbol: {symbol}");
        };

        let recommender = match GeminiClient::from_settings(&settings) {
            Ok(client) => Recommender::new(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "recommendations disabled; using the neutral default");
                Recommender::disabled()
            }
        };

        let result = recommender.recommend(instrument).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    feed.shutdown().await?;
    let _ = feed_task.await;
    Ok(())
}

fn init_sentry(settings: &nse_feed_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
