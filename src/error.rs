//! Error types for the relay
//!
//! Errors surface in two places: startup (configuration, client construction)
//! and logging. Nothing in here is ever shown to chat users; user-facing text
//! comes exclusively from the configured notices.

use crate::config::ConfigError;
use crate::llm::provider::GenerationError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RelayError {
    /// Create transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Error text safe to write to logs
    pub fn log_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*[^\s&]+").expect("static regex compiles")
});

static BOT_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{6,}:[A-Za-z0-9_-]{20,}").expect("static regex compiles"));

/// Sanitize error messages before they reach the logs
///
/// Upstream errors can echo request URLs that carry credentials (Telegram
/// embeds the bot token in the path, Gemini accepts `?key=`).
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN.replace_all(message, "${1}=***").to_string();
    sanitized = BOT_TOKEN_PATTERN
        .replace_all(&sanitized, "***BOT_TOKEN***")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_constructor() {
        let error = RelayError::transport("send failed");
        assert!(matches!(error, RelayError::Transport { .. }));
        assert_eq!(error.to_string(), "Transport error: send failed");
    }

    #[test]
    fn test_internal_constructor() {
        let error = RelayError::internal("unexpected state");
        assert_eq!(error.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_config_error_converts() {
        let error: RelayError = ConfigError::MissingCredential("GEMINI_API_KEY".to_string()).into();
        assert!(matches!(error, RelayError::Config(_)));
        assert!(error.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_sanitize_redacts_query_key() {
        let message = "request to https://host/v1beta/models/x:generateContent?key=AIzaSecret failed";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("AIzaSecret"));
        assert!(sanitized.contains("key=***"));
    }

    #[test]
    fn test_sanitize_redacts_bot_token_in_url() {
        let message =
            "error sending request for url (https://api.telegram.org/bot123456789:AAEhBP0av28dKqLmZ_x-yz012345678/getMe)";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("AAEhBP0av28dKqLmZ_x-yz012345678"));
        assert!(sanitized.contains("***BOT_TOKEN***"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let sanitized = sanitize_error_message("PASSWORD=secret123 Token=abc");
        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("abc"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"ж".repeat(400));
        assert!(sanitized.ends_with("...[truncated]"));
        assert!(sanitized.len() <= 500);
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }
}
