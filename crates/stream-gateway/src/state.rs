use crate::{
    assets::{AssetProducer, AssetReader, RetryPolicy},
    config::Config,
    registry::StreamRegistry,
    session::SessionManager,
};
use common::tokens::TokenVerifier;
use std::sync::Arc;

/// Shared application state handed to every handler and background loop.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    config: Config,
    registry: StreamRegistry,
    sessions: SessionManager,
    producer: AssetProducer,
    reader: AssetReader,
    verifier: TokenVerifier,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let producer = AssetProducer::new(config.storage_dir.clone());
        let reader = AssetReader::new(
            config.storage_dir.clone(),
            RetryPolicy {
                max_retries: config.read_retries,
                base_delay: config.read_retry_base,
                max_delay: config.read_retry_max,
            },
        );
        let sessions = SessionManager::new(config.session_idle_ttl);
        let verifier = TokenVerifier::new(config.token_secret.clone());

        Self {
            inner: Arc::new(StateInner {
                config,
                registry: StreamRegistry::new(),
                sessions,
                producer,
                reader,
                verifier,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn producer(&self) -> &AssetProducer {
        &self.inner.producer
    }

    pub fn reader(&self) -> &AssetReader {
        &self.inner.reader
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }
}
