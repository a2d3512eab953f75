//! Domain models for the ingest service

pub mod borough;
pub mod conversation;
pub mod message;
pub mod sighting;

pub use borough::Borough;
pub use conversation::{Conversation, ConversationState, ConversationUpdate, Patch};
pub use message::InboundMessage;
pub use sighting::{NewSighting, QueueStats, QueuedSighting, RecordOutcome, SimilarMatch};
