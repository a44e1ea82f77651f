mod dto;
mod routes;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/health", get(routes::health))
        .route("/health/:tenant_id/:camera_id", get(routes::stream_health))
        .route("/metrics", get(routes::metrics))
        .route("/provision", post(routes::provision))
        .route("/deprovision", post(routes::deprovision))
        .route(
            "/playback/:tenant_id/:camera_id/index.m3u8",
            get(routes::playback_manifest),
        )
        .route(
            "/playback/:tenant_id/:camera_id/segment0.ts",
            get(routes::playback_segment),
        )
        .route("/sessions", get(routes::list_sessions))
        .route("/sessions/sweep", post(routes::sweep_sessions))
        .fallback(routes::not_found)
        .with_state(state)
}
