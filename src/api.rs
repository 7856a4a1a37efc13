use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{Json, Router, extract::State, routing::get};
use rtmp_bridge::{FfmpegSession, SessionState, StatsSnapshot};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub(crate) struct ApiState {
    pub session: Arc<FfmpegSession>,
    pub queue_dropped: Arc<AtomicU64>,
}

#[derive(Serialize)]
struct StatsResponse {
    state: SessionState,
    stats: StatsSnapshot,
    audio_enabled: bool,
    uptime_ms: Option<u64>,
    queue_dropped: u64,
    last_error: String,
}

pub(crate) fn start_api_server(addr: SocketAddr, state: ApiState, cancel: CancellationToken) {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/", get(index))
            .route("/stats", get(stats))
            .with_state(state);

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("stats server bind {}: {}", addr, e);
                return;
            }
        };
        log::info!("stats server started on {}", addr);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("stats server error: {}", e);
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("shutting down stats server...");
}

async fn index() -> &'static str {
    "rtmp-bridge"
}

async fn stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let session = &state.session;
    Json(StatsResponse {
        state: session.state(),
        stats: session.stats(),
        audio_enabled: session.audio_enabled(),
        uptime_ms: session.uptime().map(|d| d.as_millis() as u64),
        queue_dropped: state.queue_dropped.load(Ordering::Relaxed),
        last_error: session.last_error(),
    })
}
