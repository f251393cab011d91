//! Platform-neutral message types
//!
//! Shared by the chat adapters and the message processor.

pub mod messages;

pub use messages::*;
