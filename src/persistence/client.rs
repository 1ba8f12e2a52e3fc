//! HTTP client for the session persistence service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use url::Url;

use super::SessionStore;
use crate::dialogue::{Message, Session, SessionSummary};
use crate::endpoint::{check_status, endpoint};
use crate::identity::CredentialProvider;
use crate::{Error, Result};

/// Body of `POST /dialogue-session`
#[derive(Serialize)]
struct SaveRequest<'a> {
    user_id: &'a str,
    messages: &'a [Message],
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
}

/// Response of `POST /dialogue-session`
#[derive(Deserialize)]
struct SaveResponse {
    session_id: String,
    #[serde(default)]
    status: Option<String>,
}

/// Client for the dialogue session endpoints
#[derive(Clone)]
pub struct HttpSessionStore {
    client: reqwest::Client,
    base: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpSessionStore {
    /// Create a persistence client against `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid or the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let base = Url::parse(base_url)?;
        // Reject cannot-be-a-base URLs up front rather than on first use
        endpoint(&base, &[])?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    /// Issue an authenticated GET and decode the JSON body
    async fn get_json<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let identity = self.credentials.require().await?;
        let url = endpoint(&self.base, segments)?;

        let response = self
            .client
            .get(url.clone())
            .header(AUTHORIZATION, identity.bearer())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "persistence request failed");
                Error::Persistence(e.to_string())
            })?;

        let response = check_status(response).await.map_err(|detail| {
            tracing::error!(url = %url, detail = %detail, "persistence service error");
            Error::Persistence(detail)
        })?;

        response
            .json()
            .await
            .map_err(|e| Error::Persistence(format!("invalid response from {url}: {e}")))
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn save(
        &self,
        user_id: &str,
        messages: &[Message],
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<String> {
        let identity = self.credentials.require().await?;
        let url = endpoint(&self.base, &["dialogue-session"])?;

        let response = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, identity.bearer())
            .json(&SaveRequest {
                user_id,
                messages,
                started_at,
                ended_at,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "save request failed");
                Error::Persistence(e.to_string())
            })?;

        let response = check_status(response).await.map_err(|detail| {
            tracing::error!(detail = %detail, "save rejected");
            Error::Persistence(detail)
        })?;

        let saved: SaveResponse = response
            .json()
            .await
            .map_err(|e| Error::Persistence(format!("invalid save response: {e}")))?;

        tracing::info!(
            session_id = %saved.session_id,
            status = saved.status.as_deref().unwrap_or("unknown"),
            messages = messages.len(),
            "saved dialogue session"
        );

        Ok(saved.session_id)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let sessions: Vec<SessionSummary> =
            self.get_json(&["dialogue-sessions", user_id]).await?;
        tracing::debug!(user_id, count = sessions.len(), "listed dialogue sessions");
        Ok(sessions)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        let session: Session = self.get_json(&["dialogue-session", session_id]).await?;
        tracing::debug!(
            session_id,
            messages = session.messages.len(),
            "fetched dialogue session"
        );
        Ok(session)
    }
}
