//! Speech capture adapter
//!
//! Wraps a `RecognitionEngine` so each activation ends in exactly one
//! `CaptureOutcome`. Starting again while listening cancels the running
//! activation first; a cancelled activation never reports a transcript.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{RecognitionEngine, StopSignal};
use crate::{Error, Result};

/// Capture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    /// The last activation failed; `start` may be called again
    Error,
}

/// Why an activation failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("speech recognition is not supported on this device")]
    UnsupportedDevice,

    #[error("speech recognition failed: {0}")]
    Recognition(String),
}

/// Terminal result of one activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Final transcript, trimmed and non-empty
    Recognized(String),
    /// Listening ended without speech
    NoSpeech,
    Failed(CaptureError),
    Cancelled,
}

struct Activation {
    stop: StopSignal,
    task: JoinHandle<Result<Option<String>>>,
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.stop.stop();
        self.task.abort();
    }
}

/// One-shot speech capture over a `RecognitionEngine`
pub struct SpeechCapture {
    engine: Arc<dyn RecognitionEngine>,
    language: String,
    state: CaptureState,
    active: Option<Activation>,
}

impl SpeechCapture {
    /// Create an idle capture adapter recognizing `language`
    #[must_use]
    pub fn new(engine: Arc<dyn RecognitionEngine>, language: impl Into<String>) -> Self {
        Self {
            engine,
            language: language.into(),
            state: CaptureState::Idle,
            active: None,
        }
    }

    /// Begin listening
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedDevice` when the engine is absent; any running
    /// activation is cancelled, the adapter moves to `CaptureState::Error`
    /// and nothing is spawned
    pub fn start(&mut self) -> Result<()> {
        if self.active.take().is_some() {
            tracing::debug!("restarting capture; previous activation cancelled");
        }

        if !self.engine.is_available() {
            self.state = CaptureState::Error;
            return Err(Error::UnsupportedDevice(
                CaptureError::UnsupportedDevice.to_string(),
            ));
        }

        let engine = Arc::clone(&self.engine);
        let language = self.language.clone();
        let stop = StopSignal::new();
        let engine_stop = stop.clone();

        let task = tokio::spawn(async move { engine.recognize(&language, engine_stop).await });

        self.active = Some(Activation { stop, task });
        self.state = CaptureState::Listening;
        tracing::debug!(language = %self.language, "listening");
        Ok(())
    }

    /// Finish listening with whatever has been heard; the outcome still arrives
    pub fn stop(&self) {
        if let Some(active) = &self.active {
            active.stop.stop();
        }
    }

    /// Abandon the running activation without an outcome
    ///
    /// Returns whether an activation was running.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.active.take().is_some();
        if cancelled {
            self.state = CaptureState::Idle;
            tracing::debug!("capture cancelled");
        }
        cancelled
    }

    /// Whether an activation is running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Wait for the running activation to end
    ///
    /// Pending forever when nothing is running. Cancel-safe: dropping the
    /// future leaves the activation running.
    pub async fn outcome(&mut self) -> CaptureOutcome {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };

        let joined = (&mut active.task).await;
        self.active = None;

        let outcome = match joined {
            Ok(Ok(Some(text))) if !text.trim().is_empty() => {
                CaptureOutcome::Recognized(text.trim().to_string())
            }
            Ok(Ok(_)) => CaptureOutcome::NoSpeech,
            Ok(Err(Error::UnsupportedDevice(detail))) => {
                tracing::warn!(detail = %detail, "recognition engine unavailable");
                CaptureOutcome::Failed(CaptureError::UnsupportedDevice)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "recognition failed");
                CaptureOutcome::Failed(CaptureError::Recognition(e.to_string()))
            }
            Err(e) if e.is_cancelled() => CaptureOutcome::Cancelled,
            Err(e) => CaptureOutcome::Failed(CaptureError::Recognition(e.to_string())),
        };

        self.state = match outcome {
            CaptureOutcome::Failed(_) => CaptureState::Error,
            _ => CaptureState::Idle,
        };
        outcome
    }
}
