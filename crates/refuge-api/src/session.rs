use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use refuge_types::models::Identity;
use refuge_types::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-login session state. The two step-up flags are the only
/// authorization-relevant fields.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub pending_step_up: bool,
    pub step_up_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// In-memory session registry keyed by bearer token.
///
/// A missing or unknown token is always treated as unauthenticated; there
/// is no default-allow path. Logging in again as a privileged identity
/// issues a fresh session with the step-up flags reset.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, identity: Identity) -> Uuid {
        let token = Uuid::new_v4();
        let pending = identity.role.is_privileged();
        self.inner.write().await.insert(
            token,
            Session {
                identity,
                pending_step_up: pending,
                step_up_verified: false,
                created_at: Utc::now(),
            },
        );
        token
    }

    pub async fn get(&self, token: Uuid) -> Option<Session> {
        self.inner.read().await.get(&token).cloned()
    }

    /// Step-up PIN check. Only privileged sessions can pass; on success the
    /// session unlocks privileged routes until logout.
    pub async fn verify_pin(&self, token: Uuid, pin: &str, expected: &str) -> Result<(), Error> {
        let mut sessions = self.inner.write().await;
        let session = sessions.get_mut(&token).ok_or(Error::AuthDenied)?;

        if !session.identity.role.is_privileged() || expected.is_empty() || pin != expected {
            return Err(Error::AuthDenied);
        }

        session.pending_step_up = false;
        session.step_up_verified = true;
        Ok(())
    }

    pub async fn remove(&self, token: Uuid) {
        self.inner.write().await.remove(&token);
    }
}
