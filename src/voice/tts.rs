//! Text-to-speech (TTS) against an OpenAI-compatible speech endpoint

use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::endpoint::check_status;
use crate::{Error, Result};

#[derive(serde::Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    url: Url,
    api_key: SecretString,
    model: String,
    speed: f32,
}

impl TextToSpeech {
    /// Create a synthesizer for the endpoint at `url`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the URL is invalid
    pub fn new(
        url: &str,
        api_key: SecretString,
        model: impl Into<String>,
        speed: f32,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: Url::parse(url)?,
            api_key,
            model: model.into(),
            speed,
        })
    }

    /// Synthesize `text` with `voice`, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        tracing::debug!(voice, chars = text.chars().count(), "synthesizing speech");

        let response = self
            .client
            .post(self.url.clone())
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&TtsRequest {
                model: &self.model,
                input: text,
                voice,
                speed: self.speed,
            })
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        let response = check_status(response).await.map_err(Error::Tts)?;

        let audio = response.bytes().await.map_err(|e| Error::Tts(e.to_string()))?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}
