// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::models::DeltaCapture;
use crate::monitor::Monitor;
use crate::source::CounterSource;
use crate::worker::SamplerCommand;

pub(crate) struct AppState<S: CounterSource> {
    pub(crate) monitor: Arc<Monitor>,
    pub(crate) commands: mpsc::Sender<SamplerCommand>,
    pub(crate) captures_tx: broadcast::Sender<Arc<DeltaCapture>>,
    pub(crate) source: Arc<S>,
    pub(crate) config: AppConfig,
}

// derive(Clone) would demand S: Clone
impl<S: CounterSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            monitor: self.monitor.clone(),
            commands: self.commands.clone(),
            captures_tx: self.captures_tx.clone(),
            source: self.source.clone(),
            config: self.config.clone(),
        }
    }
}

pub fn app<S: CounterSource>(
    monitor: Arc<Monitor>,
    commands: mpsc::Sender<SamplerCommand>,
    captures_tx: broadcast::Sender<Arc<DeltaCapture>>,
    source: Arc<S>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        monitor,
        commands,
        captures_tx,
        source,
        config,
    };
    Router::new()
        .route("/", get(|| async { "diskmon: database file I/O monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/status", get(http::status_handler::<S>)) // GET /api/status
        .route("/api/series", get(http::series_handler::<S>)) // GET /api/series
        .route("/api/filters", get(http::filters_handler::<S>)) // GET /api/filters
        .route("/api/intervals", get(http::intervals_handler)) // GET /api/intervals
        .route("/api/capture/start", post(http::start_handler::<S>)) // POST /api/capture/start
        .route("/api/capture/stop", post(http::stop_handler::<S>)) // POST /api/capture/stop
        .route("/api/capture/clear", post(http::clear_handler::<S>)) // POST /api/capture/clear
        .route("/api/capture/interval", post(http::interval_handler::<S>)) // POST /api/capture/interval
        .route("/api/session", get(http::session_handler::<S>)) // GET /api/session
        .route("/api/session/save", post(http::save_session_handler::<S>)) // POST /api/session/save
        .route("/api/session/load", post(http::load_session_handler::<S>)) // POST /api/session/load
        .route("/api/export.csv", get(http::export_csv_handler::<S>)) // GET /api/export.csv
        .route("/api/diagnostic", get(http::diagnostic_handler::<S>)) // GET /api/diagnostic
        .route("/ws/captures", get(ws::ws_captures::<S>)) // WS /ws/captures
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
