//! Speech playback adapter
//!
//! Latest wins: speaking a new utterance cancels the one in progress. Every
//! utterance that is accepted ends in exactly one terminal event
//! (`Finished`, `Cancelled` or `Failed`). Playback problems are reported
//! on the event channel and never surface as dialogue errors.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{StopSignal, SynthesisEngine, Utterance, Voice};
use crate::Error;

/// Identifies one accepted utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utt-{}", self.0)
    }
}

/// Why playback failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("speech synthesis is not supported on this device")]
    Unsupported,

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Playback lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { id: UtteranceId },
    Finished { id: UtteranceId },
    Cancelled { id: UtteranceId },
    /// `id` is `None` when the utterance was refused before being accepted
    Failed {
        id: Option<UtteranceId>,
        error: PlaybackError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Playing,
    Done,
}

/// Terminal-event bookkeeping shared by the adapter and one utterance task
#[derive(Clone)]
struct Tracker {
    id: UtteranceId,
    phase: Arc<Mutex<Phase>>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl Tracker {
    fn phase(&self) -> Phase {
        self.phase.lock().map_or(Phase::Done, |p| *p)
    }

    fn started(&self) {
        let Ok(mut phase) = self.phase.lock() else {
            return;
        };
        if *phase == Phase::Pending {
            *phase = Phase::Playing;
            let _ = self.events.send(PlaybackEvent::Started { id: self.id });
        }
    }

    /// Emit `event` unless a terminal event was already sent
    fn finish(&self, event: PlaybackEvent) -> bool {
        let Ok(mut phase) = self.phase.lock() else {
            return false;
        };
        if *phase == Phase::Done {
            return false;
        }
        *phase = Phase::Done;
        let _ = self.events.send(event);
        true
    }
}

struct ActiveUtterance {
    tracker: Tracker,
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// Fire-and-forget speech playback over a `SynthesisEngine`
pub struct SpeechPlayback {
    engine: Arc<dyn SynthesisEngine>,
    catalog_wait: Duration,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    current: Option<ActiveUtterance>,
    next_id: u64,
    disabled: Arc<AtomicBool>,
}

impl SpeechPlayback {
    /// Create an adapter and the receiver for its events
    ///
    /// `catalog_wait` bounds how long an utterance waits for an empty voice
    /// catalog to populate before falling back to the engine default.
    #[must_use]
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        catalog_wait: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                engine,
                catalog_wait,
                events,
                current: None,
                next_id: 0,
                disabled: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Speak `text` in `language`, cancelling whatever is playing
    ///
    /// Returns `None` when nothing was queued: blank text, or synthesis is
    /// unsupported. Unsupported is reported once; later calls are no-ops.
    pub fn speak(&mut self, text: &str, language: &str) -> Option<UtteranceId> {
        if self.disabled.load(Ordering::SeqCst) {
            tracing::trace!("playback disabled; skipping utterance");
            return None;
        }

        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("ignoring blank utterance");
            return None;
        }

        if !self.engine.is_available() {
            self.disabled.store(true, Ordering::SeqCst);
            tracing::warn!("speech synthesis unavailable; playback disabled");
            let _ = self.events.send(PlaybackEvent::Failed {
                id: None,
                error: PlaybackError::Unsupported,
            });
            return None;
        }

        self.cancel();

        self.next_id += 1;
        let id = UtteranceId(self.next_id);
        let tracker = Tracker {
            id,
            phase: Arc::new(Mutex::new(Phase::Pending)),
            events: self.events.clone(),
        };
        let stop = StopSignal::new();

        let task = tokio::spawn(run_utterance(
            Arc::clone(&self.engine),
            Utterance {
                text: text.to_string(),
                language: language.to_string(),
                voice: None,
            },
            self.catalog_wait,
            stop.clone(),
            tracker.clone(),
            Arc::clone(&self.disabled),
        ));

        tracing::debug!(%id, language, chars = text.chars().count(), "utterance queued");
        self.current = Some(ActiveUtterance {
            tracker,
            stop,
            task,
        });
        Some(id)
    }

    /// Cancel the utterance in progress, if any
    ///
    /// Returns the id of the utterance that was cut off.
    pub fn cancel(&mut self) -> Option<UtteranceId> {
        let active = self.current.take()?;
        active.stop.stop();
        active.task.abort();

        let id = active.tracker.id;
        active
            .tracker
            .finish(PlaybackEvent::Cancelled { id })
            .then(|| {
                tracing::debug!(%id, "utterance cancelled");
                id
            })
    }

    /// Whether an utterance is audible right now
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|a| a.tracker.phase() == Phase::Playing)
    }

    /// Whether synthesis has been found unsupported
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

async fn run_utterance(
    engine: Arc<dyn SynthesisEngine>,
    mut utterance: Utterance,
    catalog_wait: Duration,
    stop: StopSignal,
    tracker: Tracker,
    disabled: Arc<AtomicBool>,
) {
    let mut catalog = engine.voices();
    let empty = catalog.borrow().is_empty();
    if empty && !catalog_wait.is_zero() {
        tracing::debug!(wait = ?catalog_wait, "voice catalog empty; waiting");
        let waited = tokio::time::timeout(catalog_wait, catalog.wait_for(|v| !v.is_empty()))
            .await
            .is_ok();
        if !waited {
            tracing::debug!("voice catalog still empty; using engine default");
        }
    }
    utterance.voice = select_voice(&catalog.borrow(), &utterance.language);

    tracker.started();
    let id = tracker.id;
    let event = match engine.speak(&utterance, stop).await {
        Ok(()) => PlaybackEvent::Finished { id },
        Err(Error::UnsupportedDevice(detail)) => {
            tracing::warn!(%id, detail = %detail, "synthesis engine disappeared; playback disabled");
            disabled.store(true, Ordering::SeqCst);
            PlaybackEvent::Failed {
                id: Some(id),
                error: PlaybackError::Unsupported,
            }
        }
        Err(e) => {
            tracing::warn!(%id, error = %e, "utterance failed");
            PlaybackEvent::Failed {
                id: Some(id),
                error: PlaybackError::Synthesis(e.to_string()),
            }
        }
    };
    tracker.finish(event);
}

/// Pick a voice for `language`
///
/// An exact tag match wins (case-insensitive, `_` equals `-`), then a voice
/// sharing the primary subtag. `None` means use the engine default.
#[must_use]
pub fn select_voice(voices: &[Voice], language: &str) -> Option<Voice> {
    let wanted = normalize(language);
    if wanted.is_empty() {
        return None;
    }

    voices
        .iter()
        .find(|v| normalize(&v.language) == wanted)
        .or_else(|| {
            let wanted_primary = primary(&wanted);
            voices
                .iter()
                .find(|v| primary(&normalize(&v.language)) == wanted_primary)
        })
        .cloned()
}

fn normalize(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

fn primary(tag: &str) -> &str {
    tag.split('-').next().unwrap_or_default()
}
