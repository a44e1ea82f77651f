use anyhow::{Context, Result};
use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub storage_dir: PathBuf,
    pub token_secret: String,
    pub probe_interval: Duration,
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub read_retries: u32,
    pub read_retry_base: Duration,
    pub read_retry_max: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("STREAM_GATEWAY_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("STREAM_GATEWAY_ADDR must be a socket address")?;

        let storage_dir = env::var("STREAM_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/streams"));

        let token_secret = env::var("STREAM_TOKEN_SECRET")
            .unwrap_or_else(|_| "nearhome-dev-secret".to_string());

        Ok(Config {
            bind_addr,
            storage_dir,
            token_secret,
            probe_interval: env_ms("STREAM_PROBE_INTERVAL_MS", 5000)?,
            session_idle_ttl: env_ms("STREAM_SESSION_IDLE_TTL_MS", 60_000)?,
            session_sweep_interval: env_ms("STREAM_SESSION_SWEEP_MS", 5000)?,
            read_retries: env_u32("STREAM_PLAYBACK_READ_RETRIES", 0)?,
            read_retry_base: env_ms("STREAM_PLAYBACK_READ_RETRY_BASE_MS", 25)?,
            read_retry_max: env_ms("STREAM_PLAYBACK_READ_RETRY_MAX_MS", 250)?,
        })
    }
}

fn env_ms(name: &str, default_ms: u64) -> Result<Duration> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .with_context(|| format!("{name} must be an integer millisecond value")),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .with_context(|| format!("{name} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}
