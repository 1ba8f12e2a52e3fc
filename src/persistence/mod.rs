//! Session persistence
//!
//! Saving is not idempotent: every call stores a new snapshot with a new
//! session id. Callers decide when a save is warranted.

mod client;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use client::HttpSessionStore;
pub use memory::MemorySessionStore;

use crate::Result;
use crate::dialogue::{Message, Session, SessionSummary};

/// Durable storage for dialogue sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new snapshot and return its session id
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` without a signed-in identity, otherwise
    /// `Persistence` when the snapshot is not stored
    async fn save(
        &self,
        user_id: &str,
        messages: &[Message],
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<String>;

    /// List stored sessions for a user
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` or `Persistence`
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>>;

    /// Fetch one stored session with its messages
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` or `Persistence`
    async fn get_session(&self, session_id: &str) -> Result<Session>;
}
