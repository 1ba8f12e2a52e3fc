//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use parley::voice::{
    DetectorState, PlaybackError, PlaybackEvent, SAMPLE_RATE, SpeechPlayback, SynthesisEngine,
    UtteranceDetector, samples_to_wav,
};
use tokio::sync::mpsc::UnboundedReceiver;

mod common;
use common::{RecordingSynth, voice};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

fn playback(
    synth: &Arc<RecordingSynth>,
    catalog_wait: Duration,
) -> (SpeechPlayback, UnboundedReceiver<PlaybackEvent>) {
    let engine: Arc<dyn SynthesisEngine> = synth.clone();
    SpeechPlayback::new(engine, catalog_wait)
}

async fn next_event(events: &mut UnboundedReceiver<PlaybackEvent>) -> PlaybackEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("playback event in time")
        .expect("playback channel open")
}

async fn assert_quiet(events: &mut UnboundedReceiver<PlaybackEvent>) {
    let extra = tokio::time::timeout(Duration::from_millis(80), events.recv()).await;
    assert!(extra.is_err(), "unexpected playback event: {extra:?}");
}

#[test]
fn test_speech_then_silence_completes_utterance() {
    let mut detector = UtteranceDetector::new();

    // Silent samples - should not trigger
    assert!(!detector.process(&generate_silence(0.1)));
    assert_eq!(detector.state(), DetectorState::Idle);

    // Loud samples - should start an utterance
    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    detector.process(&speech);
    assert_eq!(detector.state(), DetectorState::Speaking);
    assert!(detector.has_speech());

    let more_speech = generate_sine_samples(440.0, 0.3, 0.3);
    assert!(!detector.process(&more_speech));

    assert!(detector.process(&generate_silence(0.6)));
    assert_eq!(detector.state(), DetectorState::Complete);

    let buffer = detector.take_speech_buffer();
    assert!(buffer.len() >= speech.len() + more_speech.len());
    assert_eq!(detector.state(), DetectorState::Idle);
}

#[test]
fn test_quiet_speech_is_not_an_utterance() {
    let mut detector = UtteranceDetector::new();

    let whisper = generate_sine_samples(440.0, 1.0, 0.01);
    assert!(!detector.process(&whisper));
    assert_eq!(detector.state(), DetectorState::Idle);
    assert!(!detector.has_speech());
}

#[test]
fn test_pause_inside_utterance_keeps_listening() {
    let mut detector = UtteranceDetector::new();

    detector.process(&generate_sine_samples(220.0, 0.4, 0.3));
    // Shorter than the end-of-utterance silence
    assert!(!detector.process(&generate_silence(0.3)));
    detector.process(&generate_sine_samples(220.0, 0.4, 0.3));
    assert_eq!(detector.state(), DetectorState::Speaking);

    assert!(detector.process(&generate_silence(0.6)));
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");
    assert!(wav_data.len() > 44);
}

#[test]
fn test_wav_keeps_capture_rate() {
    let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&samples, 48_000).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.channels, 1);

    let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read.len(), samples.len());
    assert_eq!(read[0], 0);
    assert!(read[3] > 32_000);
    assert!(read[4] < -32_000);
}

#[tokio::test]
async fn test_latest_utterance_wins() {
    let synth = RecordingSynth::with(
        true,
        Duration::from_millis(200),
        vec![voice("amelie", "fr-FR")],
    );
    let (mut speech, mut events) = playback(&synth, Duration::ZERO);

    let first = speech.speak("Bonjour!", "fr-FR").unwrap();
    let second = speech.speak("Comment ça va?", "fr-FR").unwrap();
    assert_ne!(first, second);

    assert_eq!(next_event(&mut events).await, PlaybackEvent::Cancelled { id: first });
    assert_eq!(next_event(&mut events).await, PlaybackEvent::Started { id: second });
    assert_eq!(next_event(&mut events).await, PlaybackEvent::Finished { id: second });
    assert_quiet(&mut events).await;

    // The first utterance never reached the engine
    assert_eq!(synth.spoken_texts(), vec!["Comment ça va?".to_string()]);
}

#[tokio::test]
async fn test_cancel_mid_utterance() {
    let synth =
        RecordingSynth::with(true, Duration::from_secs(5), vec![voice("amelie", "fr-FR")]);
    let (mut speech, mut events) = playback(&synth, Duration::ZERO);

    let id = speech.speak("Une très longue phrase", "fr-FR").unwrap();
    assert_eq!(next_event(&mut events).await, PlaybackEvent::Started { id });
    assert!(speech.is_speaking());

    assert_eq!(speech.cancel(), Some(id));
    assert_eq!(next_event(&mut events).await, PlaybackEvent::Cancelled { id });
    assert!(!speech.is_speaking());
    assert_quiet(&mut events).await;

    // Nothing left to cancel
    assert_eq!(speech.cancel(), None);
}

#[tokio::test]
async fn test_unsupported_reported_once() {
    let synth = RecordingSynth::unavailable();
    let (mut speech, mut events) = playback(&synth, Duration::ZERO);

    assert!(speech.speak("Bonjour!", "fr-FR").is_none());
    assert!(speech.speak("Encore", "fr-FR").is_none());
    assert!(speech.is_disabled());

    assert_eq!(
        next_event(&mut events).await,
        PlaybackEvent::Failed {
            id: None,
            error: PlaybackError::Unsupported,
        }
    );
    assert_quiet(&mut events).await;
    assert!(synth.spoken().is_empty());
}

#[tokio::test]
async fn test_blank_text_is_ignored() {
    let synth = RecordingSynth::new();
    let (mut speech, mut events) = playback(&synth, Duration::ZERO);

    assert!(speech.speak("   ", "fr-FR").is_none());
    assert!(speech.speak("", "fr-FR").is_none());
    assert!(!speech.is_disabled());
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn test_late_voice_catalog_is_used() {
    let synth = RecordingSynth::new();
    let (mut speech, mut events) = playback(&synth, Duration::from_secs(1));

    let id = speech.speak("Bonjour!", "fr-FR").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    synth.publish_voices(vec![voice("samantha", "en-US"), voice("amelie", "fr-CA")]);

    assert_eq!(next_event(&mut events).await, PlaybackEvent::Started { id });
    assert_eq!(next_event(&mut events).await, PlaybackEvent::Finished { id });

    let spoken = synth.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].language, "fr-FR");
    assert_eq!(spoken[0].voice, Some(voice("amelie", "fr-CA")));
}

#[tokio::test]
async fn test_empty_catalog_falls_back_to_default_voice() {
    let synth = RecordingSynth::new();
    let (mut speech, mut events) = playback(&synth, Duration::from_millis(30));

    let id = speech.speak("Bonjour!", "fr-FR").unwrap();

    assert_eq!(next_event(&mut events).await, PlaybackEvent::Started { id });
    assert_eq!(next_event(&mut events).await, PlaybackEvent::Finished { id });
    assert_eq!(synth.spoken()[0].voice, None);
}
