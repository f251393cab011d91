//! dotrelay - Telegram to Gemini message relay
//!
//! Relays chat messages that opt in with a leading marker character to a
//! text-generation service and replies with the answer.
//!
//! # Overview
//!
//! For each inbound message the relay:
//! - drops it silently unless the text starts with the marker (`.` by default)
//! - builds one generation request from the remaining text and the sender's name
//! - calls the generation client, retrying only transient "unavailable" failures
//!   a bounded number of times with a fixed delay
//! - maps the outcome to exactly one reply (the answer or a fixed notice) or to
//!   silence, and sends it at most once
//!
//! # Quick Start
//!
//! ```rust
//! use dotrelay::processing::{FilterDecision, PromptBuilder};
//! use dotrelay::protocol::{IncomingMessage, SenderName};
//!
//! let prompts = PromptBuilder::new('.', true, "Answer briefly.", "gemini-2.5-flash");
//!
//! let message = IncomingMessage::new(".What is Rust?")
//!     .with_sender(SenderName::new("Alice", None));
//!
//! match prompts.evaluate(&message) {
//!     FilterDecision::Accept(request) => {
//!         assert_eq!(request.prompt_text, "User name: Alice. Their question: What is Rust?");
//!     }
//!     FilterDecision::Ignore(reason) => panic!("unexpected ignore: {reason:?}"),
//! }
//!
//! assert!(matches!(
//!     prompts.evaluate(&IncomingMessage::new("no marker")),
//!     FilterDecision::Ignore(_)
//! ));
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod observability;
pub mod processing;
pub mod protocol;
pub mod relay;
pub mod testing;
pub mod transport;

pub use config::*;
pub use error::{RelayError, RelayResult};
pub use protocol::*;
pub use relay::MessageProcessor;
pub use transport::{ReplyOnce, ReplySink, TelegramTransport};
