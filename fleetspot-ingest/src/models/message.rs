//! Inbound message as delivered by the messaging transport

use serde::{Deserialize, Serialize};

/// One inbound event from a sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender identifier (phone number)
    pub sender: String,
    /// Raw text body, possibly empty
    pub body: String,
    /// Media URLs attached to the message, in order
    pub media_urls: Vec<String>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            media_urls: Vec::new(),
        }
    }

    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_urls.push(url.into());
        self
    }

    /// Trimmed, uppercased body used for keyword overrides
    pub fn normalized_body(&self) -> String {
        self.body.trim().to_uppercase()
    }

    pub fn has_text(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// First attached media URL, the only one processed per turn
    pub fn first_media(&self) -> Option<&str> {
        self.media_urls.first().map(String::as_str)
    }
}
