//! Utterance detection
//!
//! Splits a microphone stream into one spoken utterance using local RMS
//! energy: speech starts when energy crosses a threshold and ends after a
//! stretch of silence.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech worth transcribing (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating the utterance
    Speaking,
    /// Speech followed by silence; the utterance is ready
    Complete,
}

/// Accumulates one utterance from successive audio chunks
#[derive(Debug)]
pub struct UtteranceDetector {
    state: DetectorState,
    speech_buffer: Vec<f32>,
    speech_samples: usize,
    silence_counter: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Feed audio samples
    ///
    /// Returns true once the utterance is complete. Further samples are
    /// ignored until `reset`.
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if self.speech_samples > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        self.state = DetectorState::Complete;
                    } else {
                        // A click or cough, not an utterance
                        tracing::trace!("speech too short - resetting");
                        self.reset();
                    }
                }
            }
            DetectorState::Complete => {}
        }

        self.state == DetectorState::Complete
    }

    /// Whether enough speech has been heard to be worth transcribing
    #[must_use]
    pub fn has_speech(&self) -> bool {
        self.state != DetectorState::Idle && self.speech_samples > MIN_SPEECH_SAMPLES
    }

    /// Take the speech buffer and return to idle
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.speech_buffer);
        self.reset();
        buffer
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.speech_samples = 0;
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(calculate_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(calculate_energy(&loud) > 0.4);
    }

    #[test]
    fn completes_after_speech_then_silence() {
        let mut detector = UtteranceDetector::new();

        assert!(!detector.process(&[0.5; 1600]));
        assert_eq!(detector.state(), DetectorState::Speaking);
        for _ in 0..4 {
            assert!(!detector.process(&[0.5; 1600]));
        }
        assert!(detector.has_speech());

        let mut complete = false;
        for _ in 0..6 {
            complete = detector.process(&[0.0; 1600]);
        }
        assert!(complete);

        let buffer = detector.take_speech_buffer();
        assert!(buffer.len() > MIN_SPEECH_SAMPLES);
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn short_noise_is_discarded() {
        let mut detector = UtteranceDetector::new();

        detector.process(&[0.5; 800]);
        for _ in 0..6 {
            assert!(!detector.process(&[0.0; 1600]));
        }

        assert_eq!(detector.state(), DetectorState::Idle);
        assert!(!detector.has_speech());
    }

    #[test]
    fn silence_alone_stays_idle() {
        let mut detector = UtteranceDetector::new();
        assert!(!detector.process(&[0.001; 16000]));
        assert_eq!(detector.state(), DetectorState::Idle);
    }
}
