//! Generation client abstraction
//!
//! This module defines the request type, the closed failure taxonomy and the
//! trait every generation backend implements. The message processor depends
//! only on this module, never on a concrete backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single generation request
///
/// Built once per message and reused verbatim for every retry attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt_text: String,
    pub system_instruction: String,
    pub model: String,
}

/// Categories of non-transient upstream API failures
///
/// Derived from the status field of the upstream error envelope, falling back
/// to the HTTP status code when the envelope is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    InvalidArgument,
    FailedPrecondition,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    ResourceExhausted,
    Internal,
    DeadlineExceeded,
    /// The request was accepted but produced no usable text (safety block, empty candidate)
    Blocked,
    Unknown,
}

impl ApiErrorKind {
    /// Map an upstream status string such as `INVALID_ARGUMENT`
    pub fn from_status(status: &str) -> Option<Self> {
        let kind = match status {
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "NOT_FOUND" => Self::NotFound,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "INTERNAL" => Self::Internal,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            _ => return None,
        };
        Some(kind)
    }

    /// Map an HTTP status code when no status string is available
    pub fn from_http_status(code: u16) -> Self {
        match code {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::ResourceExhausted,
            500 => Self::Internal,
            504 => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Internal => "internal",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Upstream signalled temporary unavailability; the only retryable failure
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("API error ({kind}): {message}")]
    Api { kind: ApiErrorKind, message: String },
    /// Anything outside the upstream error taxonomy (network, decoding)
    #[error("Uncategorized failure: {0}")]
    Uncategorized(String),
    /// The client could not be constructed
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    pub fn api<S: Into<String>>(kind: ApiErrorKind, message: S) -> Self {
        Self::Api {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Short label used in logs and metrics
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Api { .. } => "api_error",
            Self::Uncategorized(_) => "uncategorized",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

/// Why the invoker gave up on a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalFailure {
    /// Every attempt hit a transient failure
    Exhausted { attempts: u32 },
    /// A non-transient failure ended the loop on first sight
    Immediate(GenerationError),
    /// The wait between attempts was cancelled (shutdown)
    Cancelled,
}

/// Tagged result of a generation attempt or of the whole retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success(String),
    RetryableFailure(GenerationError),
    FatalFailure(FatalFailure),
}

impl From<Result<String, GenerationError>> for GenerationOutcome {
    fn from(result: Result<String, GenerationError>) -> Self {
        match result {
            Ok(text) => Self::Success(text),
            Err(e) if e.is_transient() => Self::RetryableFailure(e),
            Err(e) => Self::FatalFailure(FatalFailure::Immediate(e)),
        }
    }
}

/// Generation client trait for dependency injection and testing
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Get the client name (e.g., "gemini")
    fn name(&self) -> &str;

    /// Execute exactly one generation request
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(GenerationError::Unavailable("503".to_string()).is_transient());
        assert!(!GenerationError::api(ApiErrorKind::ResourceExhausted, "quota").is_transient());
        assert!(!GenerationError::Uncategorized("io".to_string()).is_transient());
        assert!(!GenerationError::NotConfigured("key".to_string()).is_transient());
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(
            GenerationOutcome::from(Ok("hi".to_string())),
            GenerationOutcome::Success("hi".to_string())
        );
        assert!(matches!(
            GenerationOutcome::from(Err(GenerationError::Unavailable("x".to_string()))),
            GenerationOutcome::RetryableFailure(_)
        ));
        assert!(matches!(
            GenerationOutcome::from(Err(GenerationError::api(ApiErrorKind::NotFound, "x"))),
            GenerationOutcome::FatalFailure(FatalFailure::Immediate(GenerationError::Api { .. }))
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiErrorKind::from_status("INVALID_ARGUMENT"),
            Some(ApiErrorKind::InvalidArgument)
        );
        assert_eq!(
            ApiErrorKind::from_status("PERMISSION_DENIED"),
            Some(ApiErrorKind::PermissionDenied)
        );
        assert_eq!(ApiErrorKind::from_status("UNAVAILABLE"), None);
        assert_eq!(ApiErrorKind::from_status("something else"), None);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ApiErrorKind::from_http_status(401), ApiErrorKind::Unauthenticated);
        assert_eq!(ApiErrorKind::from_http_status(429), ApiErrorKind::ResourceExhausted);
        assert_eq!(ApiErrorKind::from_http_status(418), ApiErrorKind::Unknown);
    }

    #[test]
    fn test_error_display() {
        let error = GenerationError::api(ApiErrorKind::PermissionDenied, "key revoked");
        assert_eq!(error.to_string(), "API error (permission_denied): key revoked");
        assert_eq!(error.classification(), "api_error");
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerationRequest {
            prompt_text: "User name: Aida. Their question: hi".to_string(),
            system_instruction: "Be brief.".to_string(),
            model: "gemini-2.5-flash".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let back: GenerationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
