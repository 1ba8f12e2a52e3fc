//! Parley - spoken dialogue practice sessions
//!
//! This library provides the pieces of a conversational language-practice
//! session:
//! - Dialogue controller owning the live transcript and turn-taking
//! - Turn client for the conversational reply service
//! - Session persistence (remote service or in memory)
//! - Speech capture and playback adapters over device engines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Terminal / caller                   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ submit / listen / save / end
//! ┌────────────────────▼────────────────────────────────┐
//! │               DialogueController                    │
//! │   Transcript  │  SpeechCapture  │  SpeechPlayback   │
//! └──────┬─────────────────┬──────────────────┬─────────┘
//!        │                 │                  │
//! ┌──────▼──────┐  ┌───────▼───────┐  ┌───────▼────────┐
//! │ TurnClient  │  │ SessionStore  │  │ Speech engines │
//! └─────────────┘  └───────────────┘  └────────────────┘
//! ```

pub mod config;
pub mod dialogue;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod turn;
pub mod voice;

pub use config::Config;
pub use dialogue::{
    DialogueController, DialogueEvent, DialogueState, EndOutcome, Message, SaveStatus, Sender,
    Services, Session, SessionSummary, Transcript,
};
pub use error::{Error, Result};
pub use identity::{CredentialProvider, Identity, StaticCredentials};
pub use persistence::{HttpSessionStore, MemorySessionStore, SessionStore};
pub use turn::{HttpTurnClient, TurnClient, TurnReply};
