//! Dialogue session controller
//!
//! Owns the live transcript and drives one practice conversation: opening
//! turn, typed or spoken user turns, assistant replies, spoken playback and
//! saving. All mutation goes through `&mut self`; asynchronous results (the
//! in-flight turn, the capture outcome, playback events) are delivered by
//! `next_event`, which callers race against their own input.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Message, MessageId, Sender, Session, SessionDraft, Transcript};
use crate::config::DialogueConfig;
use crate::identity::CredentialProvider;
use crate::persistence::SessionStore;
use crate::turn::{TurnClient, TurnReply};
use crate::voice::{
    CaptureError, CaptureOutcome, PlaybackError, PlaybackEvent, SpeechCapture, SpeechPlayback,
};
use crate::{Error, Result};

/// Error slot text when a turn or save fails for lack of a signed-in user
pub const SIGNED_OUT_ERROR: &str = "Please sign in to continue the conversation.";

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    /// Waiting for the opening turn
    Starting,
    Idle,
    Listening,
    /// A user turn is with the turn service
    Sending,
    Ended,
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Sending => "sending",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Result of a save attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Saved { session_id: String },
    Failed { reason: String },
    /// Nothing to save
    Skipped,
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved { session_id } => write!(f, "saved as {session_id}"),
            Self::Failed { reason } => write!(f, "save failed: {reason}"),
            Self::Skipped => f.write_str("nothing to save"),
        }
    }
}

/// What `end_session` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOutcome {
    pub save: SaveStatus,
    pub message_count: usize,
}

/// Something that happened asynchronously, returned by `next_event`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueEvent {
    /// The opening assistant message was appended
    Opened { message: Message, fallback: bool },
    /// An assistant reply was appended
    Replied { message: Message },
    /// The turn failed; `message` is the appended apology
    TurnFailed { message: Message, error: String },
    /// Speech was recognized into the input buffer
    Heard { text: String, submitted: bool },
    NoSpeech,
    CaptureFailed { error: CaptureError },
    CaptureCancelled,
    Playback(PlaybackEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnKind {
    Opening,
    Reply,
}

struct PendingTurn {
    kind: TurnKind,
    task: JoinHandle<Result<TurnReply>>,
}

/// Remote collaborators of a controller
#[derive(Clone)]
pub struct Services {
    pub turns: Arc<dyn TurnClient>,
    pub store: Arc<dyn SessionStore>,
    pub credentials: Arc<dyn CredentialProvider>,
}

/// Drives one dialogue session
pub struct DialogueController {
    config: DialogueConfig,
    turn_timeout: Duration,
    services: Services,
    capture: Option<SpeechCapture>,
    playback: Option<SpeechPlayback>,
    playback_events: Option<mpsc::UnboundedReceiver<PlaybackEvent>>,

    transcript: Transcript,
    state: DialogueState,
    input: String,
    error: Option<String>,
    pending: Option<PendingTurn>,
    saving: bool,
    suggested_words: Vec<String>,
    last_spoken: Option<MessageId>,
    last_playback_error: Option<PlaybackError>,
    last_save: Option<SaveStatus>,
}

impl DialogueController {
    /// Create a controller in `Starting` without speech capture or playback
    #[must_use]
    pub fn new(services: Services, config: DialogueConfig, turn_timeout: Duration) -> Self {
        Self {
            config,
            turn_timeout,
            services,
            capture: None,
            playback: None,
            playback_events: None,
            transcript: Transcript::new(),
            state: DialogueState::Starting,
            input: String::new(),
            error: None,
            pending: None,
            saving: false,
            suggested_words: Vec::new(),
            last_spoken: None,
            last_playback_error: None,
            last_save: None,
        }
    }

    /// Enable spoken input
    #[must_use]
    pub fn with_capture(mut self, capture: SpeechCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Enable spoken replies
    #[must_use]
    pub fn with_playback(
        mut self,
        playback: SpeechPlayback,
        events: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) -> Self {
        self.playback = Some(playback);
        self.playback_events = Some(events);
        self
    }

    /// Request the opening assistant turn
    ///
    /// # Errors
    ///
    /// Returns `Busy` unless the controller is still `Starting` with no
    /// opening in flight
    pub fn start(&mut self) -> Result<()> {
        if self.state != DialogueState::Starting || self.pending.is_some() {
            return Err(Error::Busy(format!("cannot start while {}", self.state)));
        }

        tracing::info!(language = %self.config.language, "opening dialogue");
        self.spawn_turn(TurnKind::Opening, String::new());
        Ok(())
    }

    /// Continue a stored conversation instead of opening a new one
    ///
    /// Resumed messages are never spoken. A stored session with no messages
    /// falls back to a fresh opening.
    ///
    /// # Errors
    ///
    /// Returns `Busy` unless the controller is still `Starting`
    pub fn resume(&mut self, session: &Session) -> Result<()> {
        if self.state != DialogueState::Starting || self.pending.is_some() {
            return Err(Error::Busy(format!("cannot resume while {}", self.state)));
        }
        if session.messages.is_empty() {
            tracing::info!(session_id = %session.session_id, "stored session is empty; opening fresh");
            return self.start();
        }

        self.transcript = session.transcript();
        self.last_spoken = self.transcript.last().map(|m| m.id.clone());
        self.state = DialogueState::Idle;

        tracing::info!(
            session_id = %session.session_id,
            messages = self.transcript.len(),
            "resumed dialogue"
        );
        Ok(())
    }

    /// Replace the input buffer
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Submit the input buffer
    ///
    /// # Errors
    ///
    /// Same as `submit`
    pub fn submit_input(&mut self) -> Result<bool> {
        let text = self.input.clone();
        self.submit(&text)
    }

    /// Send a user turn
    ///
    /// Typed input wins over a running capture, which is cancelled. Returns
    /// `false` for blank text, which is ignored.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while the opening or another turn is in flight and
    /// `SessionEnded` after `end_session`
    pub fn submit(&mut self, text: &str) -> Result<bool> {
        match self.state {
            DialogueState::Ended => return Err(Error::SessionEnded),
            DialogueState::Starting | DialogueState::Sending => {
                return Err(Error::Busy(format!("cannot submit while {}", self.state)));
            }
            DialogueState::Idle | DialogueState::Listening => {}
        }

        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("ignoring blank submission");
            return Ok(false);
        }

        if self.capture.as_mut().is_some_and(SpeechCapture::cancel) {
            tracing::debug!("typed input replaced running capture");
        }

        let message = self.transcript.append(Sender::User, text, Utc::now());
        tracing::info!(id = %message.id, chars = text.chars().count(), "user turn");

        self.input.clear();
        self.spawn_turn(TurnKind::Reply, text.to_string());
        Ok(true)
    }

    /// Start listening for a spoken turn
    ///
    /// Calling this while already listening restarts capture.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while a turn is in flight, `SessionEnded` after
    /// `end_session`, and `UnsupportedDevice` when speech input is absent
    /// (also placed in the error slot)
    pub fn start_listening(&mut self) -> Result<()> {
        match self.state {
            DialogueState::Ended => return Err(Error::SessionEnded),
            DialogueState::Starting | DialogueState::Sending => {
                return Err(Error::Busy(format!("cannot listen while {}", self.state)));
            }
            DialogueState::Idle | DialogueState::Listening => {}
        }

        let Some(capture) = self.capture.as_mut() else {
            let error = CaptureError::UnsupportedDevice;
            self.error = Some(error.to_string());
            return Err(Error::UnsupportedDevice(error.to_string()));
        };

        if let Err(e) = capture.start() {
            self.error = Some(CaptureError::UnsupportedDevice.to_string());
            self.state = DialogueState::Idle;
            return Err(e);
        }

        self.error = None;
        self.state = DialogueState::Listening;
        Ok(())
    }

    /// Finish listening with whatever has been heard so far
    pub fn stop_listening(&mut self) {
        if let Some(capture) = &self.capture {
            capture.stop();
        }
    }

    /// Abandon listening without a result
    pub fn cancel_listening(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.cancel();
        }
        if self.state == DialogueState::Listening {
            self.state = DialogueState::Idle;
        }
    }

    /// Wait for the next asynchronous event
    ///
    /// Returns `None` when nothing can happen: no turn in flight, no
    /// capture running and no playback channel. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<DialogueEvent> {
        let turn_pending = self.pending.is_some();
        let listening = self
            .capture
            .as_ref()
            .is_some_and(SpeechCapture::is_listening);
        let has_playback = self.playback_events.is_some();

        tokio::select! {
            (kind, result) = join_turn(&mut self.pending), if turn_pending => {
                self.pending = None;
                Some(self.finish_turn(kind, result))
            }
            outcome = capture_outcome(&mut self.capture), if listening => {
                Some(self.finish_capture(outcome))
            }
            Some(event) = recv_playback(&mut self.playback_events), if has_playback => {
                Some(self.observe_playback(event))
            }
            else => None,
        }
    }

    /// Process events until no turn is in flight and nothing is listening
    ///
    /// Returns every event seen, playback included.
    pub async fn settle(&mut self) -> Vec<DialogueEvent> {
        let mut events = Vec::new();
        while self.pending.is_some()
            || self
                .capture
                .as_ref()
                .is_some_and(SpeechCapture::is_listening)
        {
            match self.next_event().await {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }

    /// Persist a snapshot of the transcript
    ///
    /// Every call stores a new snapshot with fresh timestamps.
    ///
    /// # Errors
    ///
    /// Returns `Busy` unless `Idle` and `SessionEnded` after `end_session`
    pub async fn save(&mut self) -> Result<SaveStatus> {
        match self.state {
            DialogueState::Ended => return Err(Error::SessionEnded),
            DialogueState::Idle => {}
            state => return Err(Error::Busy(format!("cannot save while {state}"))),
        }

        Ok(self.persist().await)
    }

    /// End the session, saving it once if it has any messages
    ///
    /// Capture is cancelled, an in-flight turn is detached and its result
    /// discarded, and playback is left to finish on its own.
    ///
    /// # Errors
    ///
    /// Returns `SessionEnded` if already ended
    pub async fn end_session(&mut self) -> Result<EndOutcome> {
        if self.state == DialogueState::Ended {
            return Err(Error::SessionEnded);
        }

        if let Some(capture) = self.capture.as_mut() {
            capture.cancel();
        }
        if let Some(pending) = self.pending.take() {
            tracing::debug!(kind = ?pending.kind, "detaching in-flight turn");
        }
        self.state = DialogueState::Ended;

        let save = self.persist().await;
        tracing::info!(messages = self.transcript.len(), status = %save, "dialogue ended");

        Ok(EndOutcome {
            save,
            message_count: self.transcript.len(),
        })
    }

    #[must_use]
    pub const fn state(&self) -> DialogueState {
        self.state
    }

    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    /// User-visible error, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a reply is audible right now
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.playback.as_ref().is_some_and(SpeechPlayback::is_speaking)
    }

    #[must_use]
    pub const fn is_saving(&self) -> bool {
        self.saving
    }

    /// Vocabulary the turn service suggested with its last reply
    #[must_use]
    pub fn suggested_words(&self) -> &[String] {
        &self.suggested_words
    }

    #[must_use]
    pub const fn last_playback_error(&self) -> Option<&PlaybackError> {
        self.last_playback_error.as_ref()
    }

    #[must_use]
    pub const fn last_save(&self) -> Option<&SaveStatus> {
        self.last_save.as_ref()
    }

    /// Fraction of the exchange goal reached, in `0.0..=1.0`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f32 {
        let goal = self.config.exchange_goal.max(1);
        self.transcript.len().min(goal) as f32 / goal as f32
    }

    fn spawn_turn(&mut self, kind: TurnKind, utterance: String) {
        let turns = Arc::clone(&self.services.turns);
        let credentials = Arc::clone(&self.services.credentials);
        let timeout = self.turn_timeout;

        let task = tokio::spawn(async move {
            let identity = credentials.require().await?;
            tokio::time::timeout(timeout, turns.send_turn(&utterance, &identity.user_id))
                .await
                .map_err(|_| Error::TurnService(format!("timed out after {timeout:?}")))?
        });

        self.pending = Some(PendingTurn { kind, task });
        if kind == TurnKind::Reply {
            self.state = DialogueState::Sending;
        }
    }

    fn finish_turn(&mut self, kind: TurnKind, result: Result<TurnReply>) -> DialogueEvent {
        self.state = DialogueState::Idle;

        let event = match (kind, result) {
            (TurnKind::Opening, Ok(reply)) => {
                self.suggested_words = reply.suggested_words;
                let message = self
                    .transcript
                    .append(Sender::Assistant, reply.text, Utc::now())
                    .clone();
                tracing::info!(id = %message.id, "dialogue opened");
                DialogueEvent::Opened {
                    message,
                    fallback: false,
                }
            }
            (TurnKind::Opening, Err(e)) => {
                tracing::warn!(error = %e, "opening turn failed; using canned opening");
                if matches!(e, Error::Unauthenticated) {
                    self.error = Some(SIGNED_OUT_ERROR.to_string());
                }
                let message = self
                    .transcript
                    .append(Sender::Assistant, self.config.opening_line.clone(), Utc::now())
                    .clone();
                DialogueEvent::Opened {
                    message,
                    fallback: true,
                }
            }
            (TurnKind::Reply, Ok(reply)) => {
                self.error = None;
                self.suggested_words = reply.suggested_words;
                let message = self
                    .transcript
                    .append(Sender::Assistant, reply.text, Utc::now())
                    .clone();
                tracing::info!(id = %message.id, chars = message.text.chars().count(), "assistant reply");
                DialogueEvent::Replied { message }
            }
            (TurnKind::Reply, Err(e)) => {
                tracing::warn!(error = %e, "turn failed; appending apology");
                self.error = Some(match e {
                    Error::Unauthenticated => SIGNED_OUT_ERROR.to_string(),
                    _ => self.config.turn_error.clone(),
                });
                self.suggested_words.clear();
                let message = self
                    .transcript
                    .append(Sender::Assistant, self.config.apology_line.clone(), Utc::now())
                    .clone();
                DialogueEvent::TurnFailed {
                    message,
                    error: e.to_string(),
                }
            }
        };

        self.speak_latest();
        event
    }

    fn finish_capture(&mut self, outcome: CaptureOutcome) -> DialogueEvent {
        if self.state == DialogueState::Listening {
            self.state = DialogueState::Idle;
        }

        match outcome {
            CaptureOutcome::Recognized(text) => {
                tracing::info!(chars = text.chars().count(), "speech recognized");
                self.error = None;
                self.input.clone_from(&text);

                let submitted = self.config.auto_submit_speech
                    && match self.submit_input() {
                        Ok(sent) => sent,
                        Err(e) => {
                            tracing::warn!(error = %e, "could not submit recognized speech");
                            false
                        }
                    };
                DialogueEvent::Heard { text, submitted }
            }
            CaptureOutcome::NoSpeech => {
                tracing::debug!("no speech detected");
                DialogueEvent::NoSpeech
            }
            CaptureOutcome::Failed(error) => {
                self.error = Some(error.to_string());
                DialogueEvent::CaptureFailed { error }
            }
            CaptureOutcome::Cancelled => DialogueEvent::CaptureCancelled,
        }
    }

    fn observe_playback(&mut self, event: PlaybackEvent) -> DialogueEvent {
        if let PlaybackEvent::Failed { id, error } = &event {
            tracing::warn!(?id, error = %error, "playback failed");
            self.last_playback_error = Some(error.clone());
        }
        DialogueEvent::Playback(event)
    }

    /// Speak the newest assistant message once
    fn speak_latest(&mut self) {
        let Some(last) = self.transcript.last() else {
            return;
        };
        if last.sender != Sender::Assistant || self.last_spoken.as_ref() == Some(&last.id) {
            return;
        }

        self.last_spoken = Some(last.id.clone());
        if let Some(playback) = self.playback.as_mut() {
            playback.speak(&last.text, &self.config.language);
        }
    }

    async fn persist(&mut self) -> SaveStatus {
        if self.transcript.is_empty() {
            tracing::debug!("empty transcript; skipping save");
            let status = SaveStatus::Skipped;
            self.last_save = Some(status.clone());
            return status;
        }

        self.saving = true;
        let status = self.persist_snapshot().await;
        self.saving = false;

        self.last_save = Some(status.clone());
        status
    }

    async fn persist_snapshot(&mut self) -> SaveStatus {
        let Some(identity) = self.services.credentials.identity().await else {
            self.error = Some(SIGNED_OUT_ERROR.to_string());
            return SaveStatus::Failed {
                reason: Error::Unauthenticated.to_string(),
            };
        };
        let Some(draft) = SessionDraft::from_transcript(&identity.user_id, &self.transcript) else {
            return SaveStatus::Skipped;
        };

        match self
            .services
            .store
            .save(&draft.user_id, &draft.messages, draft.started_at, draft.ended_at)
            .await
        {
            Ok(session_id) => {
                tracing::info!(session_id = %session_id, messages = draft.messages.len(), "session saved");
                SaveStatus::Saved { session_id }
            }
            Err(Error::Unauthenticated) => {
                self.error = Some(SIGNED_OUT_ERROR.to_string());
                SaveStatus::Failed {
                    reason: Error::Unauthenticated.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "session save failed");
                SaveStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

async fn join_turn(pending: &mut Option<PendingTurn>) -> (TurnKind, Result<TurnReply>) {
    let Some(turn) = pending.as_mut() else {
        return std::future::pending().await;
    };

    let result = match (&mut turn.task).await {
        Ok(result) => result,
        Err(e) => Err(Error::TurnService(format!("turn task failed: {e}"))),
    };
    (turn.kind, result)
}

async fn capture_outcome(capture: &mut Option<SpeechCapture>) -> CaptureOutcome {
    match capture.as_mut() {
        Some(capture) => capture.outcome().await,
        None => std::future::pending().await,
    }
}

async fn recv_playback(
    events: &mut Option<mpsc::UnboundedReceiver<PlaybackEvent>>,
) -> Option<PlaybackEvent> {
    match events.as_mut() {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
