//! HTTP client for the conversational turn service

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use url::Url;

use super::{TurnClient, TurnReply, parse_reply};
use crate::endpoint::{check_status, endpoint};
use crate::identity::CredentialProvider;
use crate::{Error, Result};

#[derive(Serialize)]
struct TurnRequest<'a> {
    message: &'a str,
    user_id: &'a str,
}

/// Posts turns to `{base}/dialogue` with a bearer token
#[derive(Clone)]
pub struct HttpTurnClient {
    client: reqwest::Client,
    url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTurnClient {
    /// Create a turn client against `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let base = Url::parse(base_url)?;

        Ok(Self {
            client: reqwest::Client::new(),
            url: endpoint(&base, &["dialogue"])?,
            credentials,
        })
    }
}

#[async_trait]
impl TurnClient for HttpTurnClient {
    async fn send_turn(&self, utterance: &str, user_id: &str) -> Result<TurnReply> {
        let identity = self.credentials.require().await?;

        tracing::debug!(
            url = %self.url,
            opening = utterance.is_empty(),
            chars = utterance.chars().count(),
            "sending turn"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header(AUTHORIZATION, identity.bearer())
            .json(&TurnRequest {
                message: utterance,
                user_id,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "turn request failed");
                Error::TurnService(e.to_string())
            })?;

        let response = check_status(response).await.map_err(|detail| {
            tracing::error!(detail = %detail, "turn service error");
            Error::TurnService(detail)
        })?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "turn response is not JSON");
            Error::MalformedReply(format!("response is not JSON: {e}"))
        })?;

        let reply = parse_reply(&body)?;
        tracing::debug!(
            reply_len = reply.text.len(),
            suggestions = reply.suggested_words.len(),
            "turn reply received"
        );

        Ok(reply)
    }
}
