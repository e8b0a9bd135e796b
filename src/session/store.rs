//! Session registry interface and in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::authz::model::{Principal, UserId};
use crate::authz::store::StoreError;

/// A server-side record binding a client token to its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Client public key (PEM or base64 DER) used to seal responses.
    pub public_key: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub device_id: Option<String>,
    /// Authenticated user, if the session has been logged in.
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// Expiry is advisory; callers decide what to do with it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn principal(&self) -> Option<Principal> {
        self.user_id.map(|user_id| Principal { user_id })
    }
}

/// Parameters for [`SessionStore::create`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub public_key: Option<String>,
    pub device_id: Option<String>,
    pub user_id: Option<UserId>,
    pub ttl: Duration,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, StoreError>;

    /// Record activity on a session.
    async fn touch(&self, token: &str) -> Result<(), StoreError>;

    async fn create(&self, new: NewSession) -> Result<Session, StoreError>;
}

/// Opaque 256-bit token, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.token.clone(), session);
    }

    /// Attach an authenticated user to an existing session.
    pub fn bind_user(&self, token: &str, user_id: UserId) -> bool {
        match self.sessions.get_mut(token) {
            Some(mut session) => {
                session.user_id = Some(user_id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(token).map(|s| s.value().clone()))
    }

    async fn touch(&self, token: &str) -> Result<(), StoreError> {
        match self.sessions.get_mut(token) {
            Some(mut session) => {
                session.last_active_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("session {token}"))),
        }
    }

    async fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            token: generate_token(),
            public_key: new.public_key,
            expires_at: now + new.ttl,
            device_id: new.device_id,
            user_id: new.user_id,
            created_at: now,
            last_active_at: now,
        };
        self.insert(session.clone());
        Ok(session)
    }
}
