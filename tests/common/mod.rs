//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use parley::config::DialogueConfig;
use parley::voice::{
    PlaybackEvent, RecognitionEngine, SpeechCapture, SpeechPlayback, StopSignal, SynthesisEngine,
    Utterance, Voice,
};
use parley::{
    DialogueController, DialogueEvent, Error, Identity, MemorySessionStore, Result, Services,
    StaticCredentials, TurnClient, TurnReply,
};

/// What the scripted turn service does with the next turn
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(&'static str),
    Fail(&'static str),
    /// Never answers
    Hang,
}

/// Turn client that plays back a script and records every call
#[derive(Default)]
pub struct ScriptedTurns {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTurns {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Utterances sent so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnClient for ScriptedTurns {
    async fn send_turn(&self, utterance: &str, _user_id: &str) -> Result<TurnReply> {
        self.calls.lock().unwrap().push(utterance.to_string());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Reply("D'accord."));

        match next {
            Scripted::Reply(text) => Ok(TurnReply {
                text: text.to_string(),
                suggested_words: Vec::new(),
            }),
            Scripted::Fail(reason) => Err(Error::TurnService(reason.to_string())),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Synthesis engine that records utterances instead of playing them
pub struct RecordingSynth {
    available: bool,
    /// How long each utterance "plays" unless stopped
    duration: Duration,
    catalog: watch::Sender<Vec<Voice>>,
    spoken: Mutex<Vec<Utterance>>,
}

impl RecordingSynth {
    pub fn new() -> Arc<Self> {
        Self::with(true, Duration::ZERO, Vec::new())
    }

    pub fn unavailable() -> Arc<Self> {
        Self::with(false, Duration::ZERO, Vec::new())
    }

    pub fn with(available: bool, duration: Duration, voices: Vec<Voice>) -> Arc<Self> {
        let (catalog, _) = watch::channel(voices);
        Arc::new(Self {
            available,
            duration,
            catalog,
            spoken: Mutex::new(Vec::new()),
        })
    }

    /// Replace the voice catalog, as a platform populating it late would
    pub fn publish_voices(&self, voices: Vec<Voice>) {
        self.catalog.send_replace(voices);
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }
}

#[async_trait]
impl SynthesisEngine for RecordingSynth {
    fn is_available(&self) -> bool {
        self.available
    }

    fn voices(&self) -> watch::Receiver<Vec<Voice>> {
        self.catalog.subscribe()
    }

    async fn speak(&self, utterance: &Utterance, stop: StopSignal) -> Result<()> {
        self.spoken.lock().unwrap().push(utterance.clone());

        let deadline = tokio::time::Instant::now() + self.duration;
        while tokio::time::Instant::now() < deadline && !stop.is_stopped() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }
}

/// Recognition engine that answers each activation from a script
pub struct ScriptedRecognizer {
    available: bool,
    script: Mutex<VecDeque<Result<Option<String>>>>,
}

impl ScriptedRecognizer {
    pub fn new(script: impl IntoIterator<Item = Result<Option<String>>>) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            script: Mutex::new(script.into_iter().collect()),
        })
    }

    pub fn hearing(text: &str) -> Arc<Self> {
        Self::new([Ok(Some(text.to_string()))])
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(&self, _language: &str, _stop: StopSignal) -> Result<Option<String>> {
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

pub fn signed_in() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(Identity::new("learner-1", "opaque-token")))
}

pub fn voice(id: &str, language: &str) -> Voice {
    Voice {
        id: id.to_string(),
        language: language.to_string(),
    }
}

/// A controller wired to fakes, plus handles to inspect them
pub struct Harness {
    pub dialogue: DialogueController,
    pub turns: Arc<ScriptedTurns>,
    pub store: Arc<MemorySessionStore>,
    pub synth: Arc<RecordingSynth>,
}

impl Harness {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self::build(script, RecordingSynth::new(), None, Duration::from_secs(5))
    }

    pub fn build(
        script: impl IntoIterator<Item = Scripted>,
        synth: Arc<RecordingSynth>,
        recognizer: Option<Arc<ScriptedRecognizer>>,
        turn_timeout: Duration,
    ) -> Self {
        let turns = ScriptedTurns::new(script);
        let store = Arc::new(MemorySessionStore::new());

        let services = Services {
            turns: turns.clone(),
            store: store.clone(),
            credentials: signed_in(),
        };

        let engine: Arc<dyn SynthesisEngine> = synth.clone();
        let (playback, events) = SpeechPlayback::new(engine, Duration::from_millis(50));
        let mut dialogue =
            DialogueController::new(services, DialogueConfig::default(), turn_timeout)
                .with_playback(playback, events);
        if let Some(recognizer) = recognizer {
            dialogue = dialogue.with_capture(SpeechCapture::new(recognizer, "fr-FR"));
        }

        Self {
            dialogue,
            turns,
            store,
            synth,
        }
    }

    /// Start and wait for the opening message
    pub async fn opened(mut self) -> Self {
        self.dialogue.start().unwrap();
        self.dialogue.settle().await;
        self
    }

    /// Pump events until `text` has reached the synthesis engine
    pub async fn wait_until_spoken(&mut self, text: &str) -> Vec<DialogueEvent> {
        let mut events = Vec::new();
        for _ in 0..100 {
            if self.synth.spoken_texts().iter().any(|t| t == text) {
                break;
            }
            if let Ok(Some(event)) =
                tokio::time::timeout(Duration::from_millis(20), self.dialogue.next_event()).await
            {
                events.push(event);
            }
        }
        events
    }

    /// Pump events for `duration`, collecting playback notifications
    pub async fn drain_for(&mut self, duration: Duration) -> Vec<PlaybackEvent> {
        let mut playback = Vec::new();
        let deadline = tokio::time::Instant::now() + duration;
        while let Ok(Some(event)) =
            tokio::time::timeout_at(deadline, self.dialogue.next_event()).await
        {
            if let DialogueEvent::Playback(event) = event {
                playback.push(event);
            }
        }
        playback
    }
}
