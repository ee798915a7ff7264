//! Shared application state passed to all API handlers.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use aw_domain::config::Config;

use crate::runtime::coordinator::SessionCoordinator;
use crate::runtime::source::AgentSource;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Event buffer + router + turn admission, behind one facade.
    pub coordinator: Arc<SessionCoordinator>,
    /// Produces the upstream delta stream for each turn.
    pub source: Arc<dyn AgentSource>,
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        coordinator: Arc<SessionCoordinator>,
        source: Arc<dyn AgentSource>,
    ) -> Self {
        let api_token_hash = std::env::var(&config.server.api_token_env)
            .ok()
            .filter(|token| !token.is_empty())
            .map(|token| Sha256::digest(token.as_bytes()).to_vec());

        Self {
            config,
            coordinator,
            source,
            api_token_hash,
        }
    }
}
