//! Conversational turn service
//!
//! The remote service is opaque: it takes the learner's utterance (or an
//! empty string to open the conversation) and answers with the tutor's
//! reply, either flat or as a transcript whose last entry holds it.

mod client;

use async_trait::async_trait;
use serde_json::Value;

pub use client::HttpTurnClient;

use crate::{Error, Result};

/// The tutor's reply to one turn
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnReply {
    /// Normalized reply text
    pub text: String,

    /// Vocabulary the service suggests practicing next
    pub suggested_words: Vec<String>,
}

/// Sends one turn to the conversational service
#[async_trait]
pub trait TurnClient: Send + Sync {
    /// Send `utterance` on behalf of `user_id`; empty opens the conversation
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` without a signed-in identity, `TurnService`
    /// for transport or HTTP failures and `MalformedReply` when no reply
    /// text can be extracted
    async fn send_turn(&self, utterance: &str, user_id: &str) -> Result<TurnReply>;
}

/// Normalize a turn service response body into a `TurnReply`
///
/// Accepts `{"response": "..."}` or `{"transcript": [...]}` where the last
/// entry carries the assistant text, either as an `assistant` field or as
/// `text`/`content` of an entry whose `role`/`sender` is `assistant`/`ai`.
///
/// # Errors
///
/// Returns `MalformedReply` if neither shape yields non-blank text
pub fn parse_reply(body: &Value) -> Result<TurnReply> {
    let text = flat_reply(body)
        .or_else(|| transcript_reply(body))
        .ok_or_else(|| {
            Error::MalformedReply(
                "expected a non-empty `response` or a `transcript` ending in an assistant turn"
                    .to_string(),
            )
        })?;

    let suggested_words = body
        .get("suggested_words")
        .and_then(Value::as_array)
        .map(|words| {
            words
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(TurnReply {
        text,
        suggested_words,
    })
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn flat_reply(body: &Value) -> Option<String> {
    body.get("response").and_then(non_blank)
}

fn transcript_reply(body: &Value) -> Option<String> {
    let last = body.get("transcript")?.as_array()?.last()?;

    if let Some(text) = last.get("assistant").and_then(non_blank) {
        return Some(text);
    }

    let role = last
        .get("role")
        .or_else(|| last.get("sender"))
        .and_then(Value::as_str)?;
    if !matches!(role, "assistant" | "ai") {
        return None;
    }

    last.get("text")
        .or_else(|| last.get("content"))
        .and_then(non_blank)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flat_response() {
        let reply = parse_reply(&json!({"response": "Ça va bien, merci!"})).unwrap();
        assert_eq!(reply.text, "Ça va bien, merci!");
        assert!(reply.suggested_words.is_empty());
    }

    #[test]
    fn flat_response_with_suggestions() {
        let reply = parse_reply(&json!({
            "response": "Très bien!",
            "suggested_words": ["merci", "  ", 3, "bonjour"]
        }))
        .unwrap();
        assert_eq!(reply.suggested_words, ["merci", "bonjour"]);
    }

    #[test]
    fn transcript_with_assistant_field() {
        let body = json!({
            "transcript": [
                {"user": "", "assistant": "Bonjour!"},
                {"user": "Salut", "assistant": "Comment ça va?"}
            ]
        });
        assert_eq!(parse_reply(&body).unwrap().text, "Comment ça va?");
    }

    #[test]
    fn transcript_with_role_entries() {
        let body = json!({
            "transcript": [
                {"role": "user", "content": "Salut"},
                {"role": "assistant", "content": "Bonjour!"}
            ]
        });
        assert_eq!(parse_reply(&body).unwrap().text, "Bonjour!");

        let body = json!({"transcript": [{"sender": "ai", "text": "Re-bonjour"}]});
        assert_eq!(parse_reply(&body).unwrap().text, "Re-bonjour");
    }

    #[test]
    fn transcript_ending_with_user_is_malformed() {
        let body = json!({"transcript": [{"role": "user", "content": "Salut"}]});
        assert!(matches!(parse_reply(&body), Err(Error::MalformedReply(_))));
    }

    #[test]
    fn empty_transcript_is_malformed() {
        assert!(matches!(
            parse_reply(&json!({"transcript": []})),
            Err(Error::MalformedReply(_))
        ));
    }

    #[test]
    fn missing_shapes_are_malformed() {
        for body in [
            json!({}),
            json!({"response": ""}),
            json!({"response": "   "}),
            json!({"response": 42}),
            json!({"transcript": "nope"}),
            json!(null),
            json!([1, 2, 3]),
        ] {
            assert!(
                matches!(parse_reply(&body), Err(Error::MalformedReply(_))),
                "accepted {body}"
            );
        }
    }

    #[test]
    fn blank_flat_reply_falls_back_to_transcript() {
        let body = json!({
            "response": "",
            "transcript": [{"assistant": "Depuis le transcript"}]
        });
        assert_eq!(parse_reply(&body).unwrap().text, "Depuis le transcript");
    }
}
