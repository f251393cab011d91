//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the relay
//! pipeline without a Telegram bot or a Gemini API key.

pub mod mocks;

pub use mocks::*;
