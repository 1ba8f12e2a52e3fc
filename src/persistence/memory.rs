//! In-memory session store for offline use and tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::SessionStore;
use crate::dialogue::{Message, Session, SessionSummary};
use crate::identity::CredentialProvider;
use crate::{Error, Result};

/// Keeps sessions in process memory; same non-idempotent contract as the service
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<Vec<Session>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl MemorySessionStore {
    /// Create an empty store that does not check credentials
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that requires a signed-in identity per call
    #[must_use]
    pub fn with_credentials(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            credentials: Some(credentials),
        }
    }

    /// Number of stored snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Whether nothing has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn authorize(&self) -> Result<()> {
        if let Some(credentials) = &self.credentials {
            credentials.require().await?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Session>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Persistence("session store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(
        &self,
        user_id: &str,
        messages: &[Message],
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<String> {
        self.authorize().await?;

        let session_id = Uuid::new_v4().to_string();
        self.lock()?.push(Session {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            messages: messages.to_vec(),
            started_at,
            ended_at,
        });

        tracing::debug!(session_id = %session_id, messages = messages.len(), "stored session in memory");
        Ok(session_id)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        self.authorize().await?;

        Ok(self
            .lock()?
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(SessionSummary::of)
            .collect())
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.authorize().await?;

        self.lock()?
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
            .ok_or_else(|| Error::Persistence(format!("session not found: {session_id}")))
    }
}
