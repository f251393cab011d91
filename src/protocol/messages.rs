//! Message types exchanged between the chat adapter and the processor
//!
//! These types carry no transport detail: adapters build an
//! [`IncomingMessage`] from whatever their platform delivers and act on the
//! [`ReplyDecision`] the processor returns.

use serde::{Deserialize, Serialize};

/// Display name of the person who sent a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderName {
    pub first_name: String,
    pub last_name: Option<String>,
}

impl SenderName {
    pub fn new(first_name: impl Into<String>, last_name: Option<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name,
        }
    }

    /// First name, plus `" " + last name` when known
    ///
    /// Returns `None` when both parts are blank so callers can drop the name
    /// segment entirely.
    pub fn display(&self) -> Option<String> {
        let first = self.first_name.trim();
        let last = self.last_name.as_deref().map(str::trim).unwrap_or("");

        match (first.is_empty(), last.is_empty()) {
            (true, true) => None,
            (false, true) => Some(first.to_string()),
            (true, false) => Some(last.to_string()),
            (false, false) => Some(format!("{first} {last}")),
        }
    }
}

/// A single inbound chat message
///
/// # Examples
/// ```
/// use dotrelay::protocol::{IncomingMessage, SenderName};
///
/// let message = IncomingMessage::new(".How are you?")
///     .with_sender(SenderName::new("Aida", None));
/// assert_eq!(message.text.as_deref(), Some(".How are you?"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Raw text; `None` for non-text events
    pub text: Option<String>,
    pub sender: Option<SenderName>,
}

impl IncomingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: SenderName) -> Self {
        self.sender = Some(sender);
        self
    }
}

/// The single terminal result of handling one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum ReplyDecision {
    /// Send this text back to the message's origin
    Reply(String),
    /// Send nothing at all
    Silent,
}

impl ReplyDecision {
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Reply(text) => Some(text),
            Self::Silent => None,
        }
    }
}
