use std::sync::Arc;
use std::time::Duration;

use crate::auth::{IdentityVerifier, SessionStore, TokenExchanger};
use crate::console::{ConsoleOrchestrator, ResourceStore};

/// Shared state for the HTTP API.
#[derive(Clone)]
pub struct AppState {
    /// Validates bearer tokens and yields the caller's claims.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Trades the caller's token for one the target cluster accepts.
    pub exchanger: Arc<dyn TokenExchanger>,
    pub sessions: SessionStore,
    pub orchestrator: Arc<ConsoleOrchestrator>,
    /// Session lifetime when the login request gives none.
    pub session_ttl: Duration,
}

impl AppState {
    pub fn resources(&self) -> &ResourceStore {
        self.orchestrator.store()
    }
}
