//! Per-sender conversation handling

pub mod engine;
pub mod machine;

pub use engine::{Collaborators, ConversationEngine, InspectFn};
pub use machine::{after_completion, decide, plan, SessionRules};
