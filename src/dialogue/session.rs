//! Persisted session snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, Transcript};

/// A durable, timestamped snapshot of a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl Session {
    /// Transcript rebuilt from the stored messages
    #[must_use]
    pub fn transcript(&self) -> Transcript {
        Transcript::from_messages(self.messages.clone())
    }

    /// Number of stored messages
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Lightweight listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Advisory; a fetched session's own length wins
    pub message_count: usize,
}

impl SessionSummary {
    /// Summarize a full session
    #[must_use]
    pub fn of(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            message_count: session.messages.len(),
        }
    }

    /// Replace the advisory count with the fetched session's actual length
    #[must_use]
    pub fn reconcile(mut self, session: &Session) -> Self {
        let actual = session.messages.len();
        if self.session_id == session.session_id && self.message_count != actual {
            tracing::debug!(
                session_id = %self.session_id,
                advertised = self.message_count,
                actual,
                "summary message count superseded by fetched session"
            );
        }
        self.message_count = actual;
        self
    }
}

/// Snapshot inputs for a save call, recomputed from the transcript each time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub user_id: String,
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SessionDraft {
    /// Capture the transcript as it stands; `None` when it is empty
    #[must_use]
    pub fn from_transcript(user_id: &str, transcript: &Transcript) -> Option<Self> {
        let (started_at, ended_at) = transcript.time_span()?;
        Some(Self {
            user_id: user_id.to_string(),
            messages: transcript.messages().to_vec(),
            started_at,
            ended_at,
        })
    }
}
