//! Per-message relay orchestration
//!
//! Wires the filter, the retry-controlled invoker and the reply mapper
//! together for a single inbound message.

pub mod processor;

pub use processor::MessageProcessor;
