use anyhow::Result;
use std::sync::Arc;
use stream_gateway::{
    api,
    config::Config,
    probe::{run_probe_loop, SimulatedProber},
    session::run_sweep_loop,
    state::AppState,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let state = AppState::new(config.clone());
    let probe = tokio::spawn(run_probe_loop(state.clone(), Arc::new(SimulatedProber)));
    let sweep = tokio::spawn(run_sweep_loop(state.clone()));

    let app = api::router(state).layer(CorsLayer::permissive());
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        storage_dir = %config.storage_dir.display(),
        probe_interval_ms = config.probe_interval.as_millis() as u64,
        sweep_interval_ms = config.session_sweep_interval.as_millis() as u64,
        "stream-gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop both timers before releasing everything else.
    probe.abort();
    sweep.abort();
    info!("background loops stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
