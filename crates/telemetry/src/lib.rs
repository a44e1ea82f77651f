use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. The filter defaults to `info` and
/// is overridden via `RUST_LOG`. Safe to call more than once (later calls are
/// no-ops), which keeps test binaries quiet about double initialization.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
