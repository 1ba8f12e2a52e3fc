//! Speech-to-text (STT) against a Whisper-compatible endpoint

use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::endpoint::check_status;
use crate::{Error, Result};

/// Response from a Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    url: Url,
    api_key: SecretString,
    model: String,
}

impl SpeechToText {
    /// Create a transcriber for the endpoint at `url`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the URL is invalid
    pub fn new(url: &str, api_key: SecretString, model: impl Into<String>) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("API key required for transcription".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: Url::parse(url)?,
            api_key,
            model: model.into(),
        })
    }

    /// Transcribe WAV audio spoken in `language`
    ///
    /// Only the primary subtag of `language` is sent (`fr-FR` becomes `fr`).
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String> {
        let language = primary_subtag(language);
        tracing::debug!(audio_bytes = audio.len(), language, "starting transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());
        if !language.is_empty() {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(self.url.clone())
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                Error::Stt(e.to_string())
            })?;

        let response = check_status(response).await.map_err(|detail| {
            tracing::error!(detail = %detail, "transcription API error");
            Error::Stt(detail)
        })?;

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("invalid transcription response: {e}")))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

/// `fr-FR` -> `fr`
fn primary_subtag(language: &str) -> &str {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
}
