//! Messages and the append-only transcript

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque message identifier
///
/// Freshly created ids are UUIDv7, so they sort in creation order. Ids read
/// back from storage are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new time-ordered id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the id as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    /// The learner
    #[serde(rename = "user")]
    User,
    /// The tutor
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

impl Sender {
    /// Wire name used by the persistence service
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "ai",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh id
    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            text: text.into(),
            sender,
            timestamp,
        }
    }
}

/// Ordered, append-only sequence of messages
///
/// Insertion order is conversation order, and timestamps never decrease: a
/// timestamp earlier than the last message's (clock adjustment, skew) is
/// raised to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Rebuild a transcript from stored messages, restoring the time ordering
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut transcript = Self::new();
        for message in messages {
            transcript.push(message);
        }
        transcript
    }

    /// Append a message built from `sender`, `text` and `timestamp`
    pub fn append(
        &mut self,
        sender: Sender,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> &Message {
        self.push(Message::new(sender, text, timestamp));
        // push always leaves at least one message
        &self.messages[self.messages.len() - 1]
    }

    fn push(&mut self, mut message: Message) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                tracing::debug!(
                    id = %message.id,
                    "message timestamp earlier than previous, clamping"
                );
                message.timestamp = last.timestamp;
            }
        }
        self.messages.push(message);
    }

    /// All messages in order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// First and last timestamps, if any messages exist
    #[must_use]
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.messages.first()?.timestamp, self.messages.last()?.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn sender_wire_names() {
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Sender::Assistant).unwrap(), "\"ai\"");

        let ai: Sender = serde_json::from_str("\"ai\"").unwrap();
        let assistant: Sender = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(ai, Sender::Assistant);
        assert_eq!(assistant, Sender::Assistant);
    }

    #[test]
    fn generated_ids_are_unique_and_ordered() {
        let ids: Vec<MessageId> = (0..100).map(|_| MessageId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn append_preserves_order() {
        let mut transcript = Transcript::new();
        let now = Utc::now();
        transcript.append(Sender::Assistant, "Bonjour", now);
        transcript.append(Sender::User, "Salut", now + Duration::seconds(1));

        let texts: Vec<&str> = transcript.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["Bonjour", "Salut"]);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut transcript = Transcript::new();
        let now = Utc::now();
        transcript.append(Sender::Assistant, "first", now);
        let second = transcript
            .append(Sender::User, "second", now - Duration::seconds(30))
            .clone();

        assert_eq!(second.timestamp, now);
        let stamps: Vec<_> = transcript.messages().iter().map(|m| m.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn time_span_of_empty_transcript() {
        assert!(Transcript::new().time_span().is_none());
    }

    #[test]
    fn time_span_uses_first_and_last() {
        let mut transcript = Transcript::new();
        let start = Utc::now();
        transcript.append(Sender::Assistant, "a", start);
        transcript.append(Sender::User, "b", start + Duration::seconds(5));
        transcript.append(Sender::Assistant, "c", start + Duration::seconds(9));

        assert_eq!(
            transcript.time_span(),
            Some((start, start + Duration::seconds(9)))
        );
    }

    #[test]
    fn message_json_shape() {
        let message = Message::new(Sender::User, "Bonjour", Utc::now());
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["sender"], "user");
        assert_eq!(value["text"], "Bonjour");
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_string());
    }
}
