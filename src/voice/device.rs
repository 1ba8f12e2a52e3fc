//! Device speech engines: microphone + transcription, synthesis + speaker
//!
//! cpal streams are not `Send`, so each capture or playback runs start to
//! finish on a blocking thread and watches its `StopSignal`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::watch;

use super::{
    AudioCapture, AudioPlayback, RecognitionEngine, SpeechToText, StopSignal, SynthesisEngine,
    TextToSpeech, Utterance, UtteranceDetector, Voice, input_available, output_available,
    samples_to_wav,
};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// How often buffered microphone samples are fed to the detector
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Hard cap on a single utterance
const MAX_UTTERANCE: Duration = Duration::from_secs(60);

/// Microphone capture with energy-based endpointing and remote transcription
pub struct DeviceRecognitionEngine {
    stt: Arc<SpeechToText>,
    listen_timeout: Duration,
    available: bool,
}

impl DeviceRecognitionEngine {
    #[must_use]
    pub fn new(stt: SpeechToText, listen_timeout: Duration) -> Self {
        let available = input_available();
        if !available {
            tracing::info!("no microphone found; speech input unavailable");
        }

        Self {
            stt: Arc::new(stt),
            listen_timeout,
            available,
        }
    }

    /// Build from voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if the transcription endpoint is misconfigured
    pub fn from_config(config: &VoiceConfig, api_key: SecretString) -> Result<Self> {
        let stt = SpeechToText::new(&config.stt_url, api_key, config.stt_model.clone())?;
        Ok(Self::new(stt, config.listen_timeout()))
    }
}

#[async_trait]
impl RecognitionEngine for DeviceRecognitionEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(&self, language: &str, stop: StopSignal) -> Result<Option<String>> {
        let listen_timeout = self.listen_timeout;
        let recorded = tokio::task::spawn_blocking(move || record_utterance(&stop, listen_timeout))
            .await
            .map_err(|e| Error::Recognition(format!("capture thread failed: {e}")))??;

        let Some((samples, sample_rate)) = recorded else {
            return Ok(None);
        };

        let wav = samples_to_wav(&samples, sample_rate)?;
        let text = self
            .stt
            .transcribe(&wav, language)
            .await
            .map_err(|e| Error::Recognition(e.to_string()))?;

        Ok(Some(text).filter(|t| !t.trim().is_empty()))
    }
}

/// Record until the detector sees a complete utterance, `stop` is raised,
/// or nothing was said within `listen_timeout`
fn record_utterance(
    stop: &StopSignal,
    listen_timeout: Duration,
) -> Result<Option<(Vec<f32>, u32)>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    capture.clear_buffer();

    let mut detector = UtteranceDetector::new();
    let started = Instant::now();

    loop {
        std::thread::sleep(CHUNK_INTERVAL);

        if detector.process(&capture.take_buffer()) {
            break;
        }
        if stop.is_stopped() {
            tracing::debug!("listening stopped by request");
            break;
        }
        let elapsed = started.elapsed();
        if !detector.has_speech() && elapsed > listen_timeout {
            tracing::debug!(?elapsed, "no speech before listen timeout");
            break;
        }
        if elapsed > MAX_UTTERANCE {
            tracing::warn!("utterance exceeded maximum length; truncating");
            break;
        }
    }

    capture.stop();

    if !detector.has_speech() {
        return Ok(None);
    }
    Ok(Some((detector.take_speech_buffer(), capture.sample_rate())))
}

/// Remote synthesis played on the default speaker
pub struct DeviceSynthesisEngine {
    tts: Arc<TextToSpeech>,
    default_voice: String,
    catalog: watch::Sender<Vec<Voice>>,
    available: bool,
}

impl DeviceSynthesisEngine {
    #[must_use]
    pub fn new(tts: TextToSpeech, default_voice: impl Into<String>, voices: Vec<Voice>) -> Self {
        let available = output_available();
        if !available {
            tracing::info!("no speaker found; speech output unavailable");
        }

        let (catalog, _) = watch::channel(voices);

        Self {
            tts: Arc::new(tts),
            default_voice: default_voice.into(),
            catalog,
            available,
        }
    }

    /// Build from voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if the speech endpoint is misconfigured
    pub fn from_config(config: &VoiceConfig, api_key: SecretString) -> Result<Self> {
        let tts = TextToSpeech::new(
            &config.tts_url,
            api_key,
            config.tts_model.clone(),
            config.tts_speed,
        )?;
        let voices = config
            .voices
            .iter()
            .map(|v| Voice {
                id: v.id.clone(),
                language: v.language.clone(),
            })
            .collect();

        Ok(Self::new(tts, config.default_voice.clone(), voices))
    }
}

#[async_trait]
impl SynthesisEngine for DeviceSynthesisEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn voices(&self) -> watch::Receiver<Vec<Voice>> {
        self.catalog.subscribe()
    }

    async fn speak(&self, utterance: &Utterance, stop: StopSignal) -> Result<()> {
        let voice = utterance
            .voice
            .as_ref()
            .map_or(self.default_voice.as_str(), |v| v.id.as_str());

        let mp3 = self.tts.synthesize(&utterance.text, voice).await?;
        if stop.is_stopped() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || {
            let playback = AudioPlayback::new()?;
            playback.play_mp3_blocking(&mp3, &stop)
        })
        .await
        .map_err(|e| Error::Audio(format!("playback thread failed: {e}")))??;

        Ok(())
    }
}
