//! Generation client layer
//!
//! This module provides a backend-agnostic interface for text generation
//! and the Gemini implementation used in production.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
