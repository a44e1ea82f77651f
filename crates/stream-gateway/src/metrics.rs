use crate::{registry::StreamRegistry, session::SessionManager};
use common::sessions::SessionStatus;
use common::streams::{ConnectivityState, StreamStatus};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static STREAMS_TOTAL: Lazy<IntGaugeVec> = Lazy::new(|| {
    let g = IntGaugeVec::new(
        Opts::new("nearhome_streams_total", "Provisioned streams by status"),
        &["status"],
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static STREAM_CONNECTIVITY_TOTAL: Lazy<IntGaugeVec> = Lazy::new(|| {
    let g = IntGaugeVec::new(
        Opts::new(
            "nearhome_stream_connectivity_total",
            "Streams by last probed connectivity",
        ),
        &["connectivity"],
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static STREAM_SESSIONS_TOTAL: Lazy<IntGaugeVec> = Lazy::new(|| {
    let g = IntGaugeVec::new(
        Opts::new(
            "nearhome_stream_sessions_total",
            "Playback sessions by status",
        ),
        &["status"],
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static SESSION_SWEEPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "nearhome_stream_session_sweeps_total",
        "Total session sweep passes",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PLAYBACK_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "nearhome_playback_requests_total",
            "Playback asset requests by outcome",
        ),
        &["tenant_id", "camera_id", "asset", "result"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PLAYBACK_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "nearhome_playback_errors_total",
            "Playback asset failures by error code",
        ),
        &["tenant_id", "camera_id", "asset", "code"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PLAYBACK_READ_RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "nearhome_playback_read_retries_total",
            "Transient asset read retries",
        ),
        &["tenant_id", "camera_id", "asset"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

const STREAM_STATUSES: [StreamStatus; 3] = [
    StreamStatus::Provisioning,
    StreamStatus::Ready,
    StreamStatus::Stopped,
];

const CONNECTIVITY_STATES: [ConnectivityState; 3] = [
    ConnectivityState::Online,
    ConnectivityState::Degraded,
    ConnectivityState::Offline,
];

const SESSION_STATUSES: [SessionStatus; 4] = [
    SessionStatus::Issued,
    SessionStatus::Active,
    SessionStatus::Ended,
    SessionStatus::Expired,
];

/// Refresh the gauges from current registry/session state and encode the
/// full registry in Prometheus text exposition format.
pub async fn render(streams: &StreamRegistry, sessions: &SessionManager) -> String {
    // Counter families register on first touch; keep the sweep counter in the
    // exposition even before the first sweep runs.
    let _ = SESSION_SWEEPS_TOTAL.get();

    let entries = streams.iterate().await;
    for status in STREAM_STATUSES {
        let count = entries.iter().filter(|e| e.status == status).count();
        STREAMS_TOTAL
            .with_label_values(&[status.as_str()])
            .set(count as i64);
    }
    for state in CONNECTIVITY_STATES {
        let count = entries
            .iter()
            .filter(|e| e.health.connectivity == state)
            .count();
        STREAM_CONNECTIVITY_TOTAL
            .with_label_values(&[state.as_str()])
            .set(count as i64);
    }

    let session_counts = sessions.counts_by_status().await;
    for status in SESSION_STATUSES {
        let count = session_counts.get(&status).copied().unwrap_or(0);
        STREAM_SESSIONS_TOTAL
            .with_label_values(&[status.as_str()])
            .set(count);
    }

    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}
