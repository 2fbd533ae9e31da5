//! In-memory login sessions.
//!
//! Sessions hold the identity provider tokens for a browser login so the
//! front end only has to carry an opaque session ID. Nothing here is
//! persisted; a restart logs everyone out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::error::SessionError;
use crate::tasks::PeriodicTask;

/// Number of random bytes in a session ID (hex-encoded to twice as many chars).
const SESSION_ID_BYTES: usize = 32;

/// A login session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub access_token: SecretString,
    pub id_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Tokens captured at login.
#[derive(Debug)]
pub struct SessionTokens {
    pub access_token: SecretString,
    pub id_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
}

/// Shared handle to the session map.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return its ID.
    pub async fn create(
        &self,
        user_id: &str,
        tokens: SessionTokens,
        expires_at: DateTime<Utc>,
    ) -> String {
        let id = generate_session_id();
        let session = Session {
            id: id.clone(),
            user_id: user_id.to_string(),
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            created_at: Utc::now(),
            expires_at,
        };
        self.sessions.write().await.insert(id.clone(), session);
        tracing::debug!(user_id = %user_id, expires_at = %expires_at, "Created session");
        id
    }

    /// Look up a session, deleting it if it has expired.
    pub async fn get(&self, id: &str) -> Result<Session, SessionError> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return Err(SessionError::NotFound),
                Some(session) if !session.is_expired_at(now) => return Ok(session.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock: the session may have been replaced
        // or removed since the read lock was released.
        let mut sessions = self.sessions.write().await;
        if sessions.get(id).is_some_and(|s| s.is_expired_at(now)) {
            sessions.remove(id);
            tracing::debug!("Removed expired session on lookup");
        }
        Err(SessionError::Expired)
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Delete every session belonging to a user, returning the removed IDs.
    pub async fn delete_all_for_user(&self, user_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let ids: Vec<String> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id.clone())
            .collect();
        for id in &ids {
            sessions.remove(id);
        }
        ids
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Start the periodic expiry sweep.
    pub fn spawn_sweeper(&self, interval: Duration) -> PeriodicTask {
        let store = self.clone();
        PeriodicTask::spawn("session-sweep", interval, move || {
            let store = store.clone();
            async move {
                let removed = store.sweep_expired().await;
                if removed > 0 {
                    tracing::info!(removed, "Swept expired sessions");
                }
            }
        })
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
