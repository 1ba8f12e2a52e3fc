//! Voice processing module
//!
//! The dialogue controller talks to two adapters, `SpeechCapture` and
//! `SpeechPlayback`, which in turn drive a `RecognitionEngine` and a
//! `SynthesisEngine`. The device engines (microphone + STT endpoint,
//! TTS endpoint + speaker) live in `device`; tests substitute fakes.

mod capture;
mod detector;
mod device;
mod playback;
mod recognition;
mod stt;
mod synthesis;
mod tts;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

pub use capture::{AudioCapture, SAMPLE_RATE, input_available, samples_to_wav};
pub use detector::{DetectorState, UtteranceDetector};
pub use device::{DeviceRecognitionEngine, DeviceSynthesisEngine};
pub use playback::{AudioPlayback, decode_mp3, output_available};
pub use recognition::{CaptureError, CaptureOutcome, CaptureState, SpeechCapture};
pub use stt::SpeechToText;
pub use synthesis::{PlaybackError, PlaybackEvent, SpeechPlayback, UtteranceId, select_voice};
pub use tts::TextToSpeech;

use crate::Result;

/// Stop request shared between an adapter and a running engine call
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create a signal that has not been raised
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been raised
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A synthesis voice from an engine's catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    /// BCP 47 language tag
    pub language: String,
}

/// One request to speak
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub language: String,
    /// `None` lets the engine use its default voice
    pub voice: Option<Voice>,
}

/// Device speech recognizer
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Whether this device can recognize speech at all
    fn is_available(&self) -> bool;

    /// Listen for one utterance in `language`
    ///
    /// Returns `Ok(None)` when listening ended without any speech. Raising
    /// `stop` ends listening early with whatever has been heard so far.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedDevice` if the microphone disappears, otherwise
    /// an error describing the recognition failure
    async fn recognize(&self, language: &str, stop: StopSignal) -> Result<Option<String>>;
}

/// Device speech synthesizer
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Whether this device can synthesize speech at all
    fn is_available(&self) -> bool;

    /// Voice catalog; may start empty and populate later
    fn voices(&self) -> watch::Receiver<Vec<Voice>>;

    /// Speak one utterance to completion, or until `stop` is raised
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, utterance: &Utterance, stop: StopSignal) -> Result<()>;
}
