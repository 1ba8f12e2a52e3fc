//! Dialogue data model and session controller

mod controller;
mod message;
mod session;

pub use controller::{
    DialogueController, DialogueEvent, DialogueState, EndOutcome, SIGNED_OUT_ERROR, SaveStatus,
    Services,
};
pub use message::{Message, MessageId, Sender, Transcript};
pub use session::{Session, SessionDraft, SessionSummary};
