//! Generation client implementations

pub mod gemini;

pub use gemini::*;
