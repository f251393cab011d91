//! Observability for the relay
//!
//! Structured logging, process-wide metrics and the optional health check
//! HTTP server.

pub mod health;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use health::HealthServer;
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{lifecycle_span, message_span};
