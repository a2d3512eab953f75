//! Per-sender conversation state
//!
//! A conversation is a keyed row that survives between independent inbound
//! messages. It is only ever changed through a [`ConversationUpdate`], whose
//! fields distinguish "leave alone" from "set to null".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Borough;

/// Conversation state machine states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    Idle,
    AwaitingPlate,
    AwaitingBorough,
    AwaitingName,
    /// A stored value this build does not know; recovered by resetting to idle
    Unrecognized(String),
}

impl ConversationState {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingPlate => "awaiting_plate",
            ConversationState::AwaitingBorough => "awaiting_borough",
            ConversationState::AwaitingName => "awaiting_name",
            ConversationState::Unrecognized(raw) => raw,
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "idle" => ConversationState::Idle,
            "awaiting_plate" => ConversationState::AwaitingPlate,
            "awaiting_borough" => ConversationState::AwaitingBorough,
            "awaiting_name" => ConversationState::AwaitingName,
            other => ConversationState::Unrecognized(other.to_string()),
        }
    }

    /// States whose entry overwrites any pending coordinates
    fn clears_coordinates(&self) -> bool {
        matches!(self, ConversationState::Idle | ConversationState::AwaitingPlate)
    }
}

/// Persisted conversation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub sender: String,
    pub state: ConversationState,
    pub pending_image_ref: Option<String>,
    pub pending_plate: Option<String>,
    pub pending_latitude: Option<f64>,
    pub pending_longitude: Option<f64>,
    pub pending_timestamp: Option<DateTime<Utc>>,
    pub pending_borough: Option<Borough>,
    pub pending_image_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Fresh idle conversation with every pending field null
    pub fn new(sender: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender: sender.into(),
            state: ConversationState::Idle,
            pending_image_ref: None,
            pending_plate: None,
            pending_latitude: None,
            pending_longitude: None,
            pending_timestamp: None,
            pending_borough: None,
            pending_image_timestamp: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Both pending coordinates are present
    pub fn has_gps(&self) -> bool {
        self.pending_latitude.is_some() && self.pending_longitude.is_some()
    }
}

/// Tri-state field change
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Patch<T> {
    /// Field not supplied; stored value is kept
    #[default]
    Unchanged,
    /// Field explicitly set to null
    Clear,
    /// Field set to a value
    Set(T),
}

impl<T> Patch<T> {
    /// `Some` becomes `Set`, `None` becomes an explicit `Clear`
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }

    /// `Some` becomes `Set`, `None` leaves the field alone
    pub fn if_some(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Unchanged,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    /// The value to write, or `None` when the field is untouched
    pub fn as_write(&self) -> Option<Option<&T>> {
        match self {
            Patch::Unchanged => None,
            Patch::Clear => Some(None),
            Patch::Set(v) => Some(Some(v)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Unchanged => Patch::Unchanged,
            Patch::Clear => Patch::Clear,
            Patch::Set(v) => Patch::Set(f(v)),
        }
    }

    pub fn apply(self, target: &mut Option<T>) {
        match self {
            Patch::Unchanged => {}
            Patch::Clear => *target = None,
            Patch::Set(v) => *target = Some(v),
        }
    }
}

/// Partial update of a conversation row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationUpdate {
    pub state: Option<ConversationState>,
    pub pending_image_ref: Patch<String>,
    pub pending_plate: Patch<String>,
    pub pending_latitude: Patch<f64>,
    pub pending_longitude: Patch<f64>,
    pub pending_timestamp: Patch<DateTime<Utc>>,
    pub pending_borough: Patch<Borough>,
    pub pending_image_timestamp: Patch<DateTime<Utc>>,
}

impl ConversationUpdate {
    /// Back to idle with every pending field cleared
    pub fn reset() -> Self {
        Self {
            state: Some(ConversationState::Idle),
            pending_image_ref: Patch::Clear,
            pending_plate: Patch::Clear,
            pending_latitude: Patch::Clear,
            pending_longitude: Patch::Clear,
            pending_timestamp: Patch::Clear,
            pending_borough: Patch::Clear,
            pending_image_timestamp: Patch::Clear,
        }
    }

    /// State change only; pending fields untouched apart from the coordinate rule
    pub fn to_state(state: ConversationState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Apply the coordinate rule
    ///
    /// Entering `Idle` or `AwaitingPlate` always writes both coordinates, so an
    /// unsupplied coordinate becomes an explicit null instead of keeping a value
    /// left over from an earlier image.
    pub fn normalized(mut self) -> Self {
        if self.state.as_ref().is_some_and(ConversationState::clears_coordinates) {
            if self.pending_latitude.is_unchanged() {
                self.pending_latitude = Patch::Clear;
            }
            if self.pending_longitude.is_unchanged() {
                self.pending_longitude = Patch::Clear;
            }
        }
        self
    }

    /// Pending image of `conversation` that this update clears or replaces
    pub fn released_image<'a>(&self, conversation: &'a Conversation) -> Option<&'a str> {
        let current = conversation.pending_image_ref.as_deref()?;
        match &self.pending_image_ref {
            Patch::Unchanged => None,
            Patch::Set(next) if next == current => None,
            Patch::Set(_) | Patch::Clear => Some(current),
        }
    }

    /// True when nothing would be written
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.pending_image_ref.is_unchanged()
            && self.pending_plate.is_unchanged()
            && self.pending_latitude.is_unchanged()
            && self.pending_longitude.is_unchanged()
            && self.pending_timestamp.is_unchanged()
            && self.pending_borough.is_unchanged()
            && self.pending_image_timestamp.is_unchanged()
    }

    /// Apply to an in-memory conversation, coordinate rule included
    pub fn apply_to(self, conversation: &mut Conversation, now: DateTime<Utc>) {
        let update = self.normalized();
        if let Some(state) = update.state {
            conversation.state = state;
        }
        update.pending_image_ref.apply(&mut conversation.pending_image_ref);
        update.pending_plate.apply(&mut conversation.pending_plate);
        update.pending_latitude.apply(&mut conversation.pending_latitude);
        update.pending_longitude.apply(&mut conversation.pending_longitude);
        update.pending_timestamp.apply(&mut conversation.pending_timestamp);
        update.pending_borough.apply(&mut conversation.pending_borough);
        update
            .pending_image_timestamp
            .apply(&mut conversation.pending_image_timestamp);
        conversation.updated_at = now;
    }
}
