use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nse_feed_core::dashboard::{DashboardSession, PredictionBusy, PredictionTicket};
use nse_feed_core::domain::chart::{chart_points, ChartPoint};
use nse_feed_core::domain::instrument::Instrument;
use nse_feed_core::domain::recommendation::RecommendationResult;
use nse_feed_core::feed::{FeedHandle, FeedMode, FeedService, LifecycleState, Snapshot};
use nse_feed_core::ingest::provider::{QuoteSource, YahooChartProvider};
use nse_feed_core::llm::gemini::GeminiClient;
use nse_feed_core::llm::Recommender;
use nse_feed_core::storage::preferences::{PreferenceStore, Theme};

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

    let feed_config = nse_feed_core::config::FeedConfig::from_env();
    let source: Option<Arc<dyn QuoteSource>> =
        match YahooChartProvider::from_settings(&settings, feed_config.fetch_timeout) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "market data client unavailable; live mode will simulate");
                None
            }
        };

    let recommender = match GeminiClient::from_settings(&settings) {
        Ok(client) => Recommender::new(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "recommendations disabled; predictions return the neutral default");
            Recommender::disabled()
        }
    };

    let (feed, feed_task) = FeedService::spawn(
        nse_feed_core::feed::universe::default_universe(),
        feed_config,
        source,
    );

    let (latest_tx, latest_rx) = watch::channel(None);
    feed.subscribe(latest_tx).await?;
    feed.start().await?;

    let state = AppState {
        feed: feed.clone(),
        latest: latest_rx,
        session: Arc::new(Mutex::new(DashboardSession::default())),
        recommender,
        preferences: PreferenceStore::from_settings(&settings),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshot", get(get_snapshot))
        .route("/instruments/:symbol", get(get_instrument))
        .route("/feed", get(get_feed_state))
        .route("/mode", post(set_mode))
        .route("/session", get(get_session))
        .route("/selection", post(set_selection))
        .route("/chart", get(get_chart))
        .route("/predict", post(predict))
        .route("/preferences/theme", get(get_theme).put(put_theme))
        .route("/preferences/theme/toggle", post(toggle_theme))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = feed.stop().await;
    let _ = feed.shutdown().await;
    let _ = feed_task.await;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    feed: FeedHandle,
    latest: watch::Receiver<Option<Snapshot>>,
    session: Arc<Mutex<DashboardSession>>,
    recommender: Recommender,
    preferences: PreferenceStore,
}

impl AppState {
    async fn snapshot(&self) -> Result<Snapshot, StatusCode> {
        let latest = self.latest.borrow().clone();
        if let Some(snapshot) = latest {
            return Ok(snapshot);
        }
        self.feed.snapshot().await.map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::SERVICE_UNAVAILABLE
        })
    }

    async fn instrument(&self, symbol: &str) -> Result<Instrument, StatusCode> {
        self.snapshot()
            .await?
            .instrument(symbol)
            .cloned()
            .ok_or(StatusCode::NOT_FOUND)
    }
}

async fn get_snapshot(State(state): State<AppState>) -> Result<Json<Snapshot>, StatusCode> {
    Ok(Json(state.snapshot().await?))
}

async fn get_instrument(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Instrument>, StatusCode> {
    Ok(Json(state.instrument(&symbol).await?))
}

#[derive(Debug, Serialize)]
struct FeedState {
    state: LifecycleState,
    mode: FeedMode,
    sequence: u64,
}

async fn get_feed_state(State(state): State<AppState>) -> Result<Json<FeedState>, StatusCode> {
    let lifecycle = state.feed.state().await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    let snapshot = state.snapshot().await?;
    Ok(Json(FeedState {
        state: lifecycle,
        mode: snapshot.mode,
        sequence: snapshot.sequence,
    }))
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: FeedMode,
}

async fn set_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<Snapshot>, StatusCode> {
    state.feed.set_mode(req.mode).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(state.snapshot().await?))
}

#[derive(Debug, Serialize)]
struct SessionView {
    selected: String,
    predicting: bool,
    recommendation: Option<RecommendationResult>,
}

async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    let session = state.session.lock().await;
    Json(SessionView {
        selected: session.selected().to_string(),
        predicting: session.is_predicting(),
        recommendation: session.recommendation().cloned(),
    })
}

#[derive(Debug, Deserialize)]
struct SelectionRequest {
    symbol: String,
}

async fn set_selection(
    State(state): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    let instrument = state.instrument(&req.symbol).await?;

    let mut session = state.session.lock().await;
    session.select(instrument.symbol());
    Ok(Json(SessionView {
        selected: session.selected().to_string(),
        predicting: session.is_predicting(),
        recommendation: session.recommendation().cloned(),
    }))
}

async fn get_chart(State(state): State<AppState>) -> Result<Json<Vec<ChartPoint>>, StatusCode> {
    let (selected, recommendation) = {
        let session = state.session.lock().await;
        (
            session.selected().to_string(),
            session.recommendation().cloned(),
        )
    };
    let instrument = state.instrument(&selected).await?;
    Ok(Json(chart_points(&instrument, recommendation.as_ref())))
}

/// Owns an in-flight prediction. Dropping it unfinished (the request was
/// cancelled, or the instrument vanished) frees the session for the next one.
struct PredictionGuard {
    session: Arc<Mutex<DashboardSession>>,
    ticket: Option<PredictionTicket>,
}

impl PredictionGuard {
    async fn begin(session: &Arc<Mutex<DashboardSession>>) -> Result<Self, PredictionBusy> {
        let ticket = session.lock().await.begin_prediction()?;
        Ok(Self {
            session: Arc::clone(session),
            ticket: Some(ticket),
        })
    }

    fn symbol(&self) -> &str {
        self.ticket.as_ref().map(|t| t.symbol.as_str()).unwrap_or_default()
    }

    async fn finish(mut self, result: RecommendationResult) {
        if let Some(ticket) = self.ticket.take() {
            self.session.lock().await.finish_prediction(ticket, result);
        }
    }
}

impl Drop for PredictionGuard {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        match self.session.try_lock() {
            Ok(mut session) => session.abandon_prediction(ticket),
            Err(_) => {
                let session = Arc::clone(&self.session);
                tokio::spawn(async move {
                    session.lock().await.abandon_prediction(ticket);
                });
            }
        }
    }
}

async fn predict(
    State(state): State<AppState>,
) -> Result<Json<RecommendationResult>, StatusCode> {
    let guard = PredictionGuard::begin(&state.session)
        .await
        .map_err(|_| StatusCode::CONFLICT)?;

    let instrument = state.instrument(guard.symbol()).await?;
    let result = state.recommender.recommend(&instrument).await;
    guard.finish(result.clone()).await;
    Ok(Json(result))
}

#[derive(Debug, Serialize, Deserialize)]
struct ThemeBody {
    theme: Theme,
}

async fn get_theme(State(state): State<AppState>) -> Result<Json<ThemeBody>, StatusCode> {
    let theme = state.preferences.theme().await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(ThemeBody { theme }))
}

async fn put_theme(
    State(state): State<AppState>,
    Json(body): Json<ThemeBody>,
) -> Result<Json<ThemeBody>, StatusCode> {
    state.preferences.set_theme(body.theme).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(body))
}

async fn toggle_theme(State(state): State<AppState>) -> Result<Json<ThemeBody>, StatusCode> {
    let theme = state.preferences.toggle_theme().await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(ThemeBody { theme }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use nse_feed_core::config::FeedConfig;
    use nse_feed_core::llm::{LlmClient, Provider};
    use std::time::Duration;

    struct PendingClient;

    #[async_trait::async_trait]
    impl LlmClient for PendingClient {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn recommend(&self, _instrument: &Instrument) -> anyhow::Result<RecommendationResult> {
            std::future::pending().await
        }
    }

    async fn test_state(recommender: Recommender) -> AppState {
        let config = FeedConfig {
            seed: Some(9),
            ..FeedConfig::default()
        };
        let (feed, _task) = FeedService::spawn(
            nse_feed_core::feed::universe::default_universe(),
            config,
            None,
        );
        let (latest_tx, latest_rx) = watch::channel(None);
        feed.subscribe(latest_tx).await.unwrap();

        let path = std::env::temp_dir().join(format!("nse_feed_api_test_{}.json", std::process::id()));
        AppState {
            feed,
            latest: latest_rx,
            session: Arc::new(Mutex::new(DashboardSession::default())),
            recommender,
            preferences: PreferenceStore::new(path),
        }
    }

    #[tokio::test]
    async fn cancelled_predict_frees_the_session() {
        let state = test_state(Recommender::new(Arc::new(PendingClient))).await;

        let first = tokio::time::timeout(Duration::from_millis(50), predict(State(state.clone()))).await;
        assert!(first.is_err());
        assert!(!state.session.lock().await.is_predicting());

        // The second request reaches the model call again instead of being rejected.
        let second = tokio::time::timeout(Duration::from_millis(50), predict(State(state.clone()))).await;
        assert!(second.is_err());
        assert!(!state.session.lock().await.is_predicting());
    }

    #[tokio::test]
    async fn overlapping_predict_is_conflict() {
        let state = test_state(Recommender::new(Arc::new(PendingClient))).await;

        let pending = tokio::spawn(predict(State(state.clone())));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(state.session.lock().await.is_predicting());

        let second = predict(State(state.clone())).await;
        assert!(matches!(second, Err(StatusCode::CONFLICT)));

        pending.abort();
        let _ = pending.await;
        tokio::task::yield_now().await;
        assert!(!state.session.lock().await.is_predicting());
    }

    #[tokio::test]
    async fn finished_predict_stores_the_result() {
        let state = test_state(Recommender::disabled()).await;

        let Json(result) = predict(State(state.clone())).await.unwrap();
        assert_eq!(result.symbol, "RELIANCE");

        let session = state.session.lock().await;
        assert!(!session.is_predicting());
        assert_eq!(session.recommendation().map(|r| r.symbol.as_str()), Some("RELIANCE"));
    }
}
