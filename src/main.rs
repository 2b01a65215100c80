//! Buzz Arcade binary entrypoint wiring the session queue, REST, WebSocket and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buzz_arcade::{
    config::AppConfig,
    dao::{
        high_score::{HighScoreStore, JsonFileHighScoreStore},
        quiz_store::QuizDeck,
    },
    routes,
    services::{
        indicator_service::DeviceHub,
        session_service::{SessionOutputs, spawn_session},
    },
    state::{AppState, SharedState, SseHub, clock::SystemTimeSource, session::Session},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let quiz = QuizDeck::load_or_fallback(&config.quiz_path, config.shuffle_questions);

    let high_scores: Arc<dyn HighScoreStore> =
        Arc::new(JsonFileHighScoreStore::new(&config.high_score_path));
    let high_score = match high_scores.load().await {
        Ok(score) => score,
        Err(err) => {
            warn!(error = %err, "failed to load high score; starting from zero");
            0
        }
    };
    info!(high_score, "high score loaded");

    let sse = SseHub::new(config.sse_capacity);
    let devices = Arc::new(DeviceHub::new());
    let session = Session::new(
        config.settings.clone(),
        Box::new(quiz),
        Arc::new(SystemTimeSource),
        high_score,
    );
    let handle = spawn_session(
        session,
        SessionOutputs {
            sse: sse.clone(),
            indicator: devices.clone(),
            high_scores: high_scores.clone(),
        },
        config.runner_options(),
    );

    let app_state = AppState::new(handle, sse, devices, high_scores, config);
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
