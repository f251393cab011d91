//! Marker filter and prompt assembly
//!
//! Decides whether an inbound message opts into processing and, if it does,
//! builds the single [`GenerationRequest`] used for every attempt.

use crate::config::RelayConfig;
use crate::llm::provider::GenerationRequest;
use crate::protocol::messages::{IncomingMessage, SenderName};

/// Why a message was dropped without a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Absent or empty text
    NoText,
    /// Text does not start with the marker character
    MissingMarker,
    /// Nothing left after stripping the marker, and empty prompts are disabled
    EmptyPrompt,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoText => "no_text",
            Self::MissingMarker => "missing_marker",
            Self::EmptyPrompt => "empty_prompt",
        }
    }
}

/// Result of running the filter over one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Ignore(IgnoreReason),
    Accept(GenerationRequest),
}

/// Builds generation requests from marked messages
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    marker: char,
    allow_empty_prompt: bool,
    system_instruction: String,
    model: String,
}

impl PromptBuilder {
    pub fn new(
        marker: char,
        allow_empty_prompt: bool,
        system_instruction: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            marker,
            allow_empty_prompt,
            system_instruction: system_instruction.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.filter.marker,
            config.filter.allow_empty_prompt,
            config.llm.system_instruction.clone(),
            config.llm.model.clone(),
        )
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    /// Strip the marker and surrounding whitespace
    ///
    /// Returns `None` when the text does not start with the marker.
    pub fn clean_prompt<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.strip_prefix(self.marker).map(str::trim)
    }

    /// Run the eligibility rule and assemble the request
    pub fn evaluate(&self, message: &IncomingMessage) -> FilterDecision {
        let text = match message.text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => return FilterDecision::Ignore(IgnoreReason::NoText),
        };

        let Some(body) = self.clean_prompt(text) else {
            return FilterDecision::Ignore(IgnoreReason::MissingMarker);
        };

        if body.is_empty() && !self.allow_empty_prompt {
            return FilterDecision::Ignore(IgnoreReason::EmptyPrompt);
        }

        FilterDecision::Accept(GenerationRequest {
            prompt_text: assemble_prompt(message.sender.as_ref(), body),
            system_instruction: self.system_instruction.clone(),
            model: self.model.clone(),
        })
    }
}

/// `"User name: {name}. Their question: {body}"`, dropping the name segment
/// when no usable name is known
pub fn assemble_prompt(sender: Option<&SenderName>, body: &str) -> String {
    match sender.and_then(SenderName::display) {
        Some(name) => format!("User name: {name}. Their question: {body}"),
        None => format!("Their question: {body}"),
    }
}
