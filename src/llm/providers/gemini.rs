//! Gemini generation client
//!
//! Executes one `generateContent` call per [`GenerationClient::generate`]
//! invocation. Retrying is not this module's job: the message processor owns
//! the retry policy and relies on the error taxonomy produced here.

use crate::config::LlmSection;
use crate::error::sanitize_error_message;
use crate::llm::provider::{ApiErrorKind, GenerationClient, GenerationError, GenerationRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Gemini client configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from the `[llm]` configuration section
    pub fn from_section(api_key: SecretString, section: &LlmSection) -> Self {
        Self {
            api_key,
            base_url: section.base_url.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
        }
    }
}

/// Gemini client implementation
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "Gemini API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Convert a generation request to the Gemini wire format (pure function)
    fn convert_request(request: &GenerationRequest) -> GeminiRequest {
        let system_instruction = if request.system_instruction.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system_instruction.clone()),
                    thought: None,
                }],
            })
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(request.prompt_text.clone()),
                    thought: None,
                }],
            }],
            system_instruction,
        }
    }

    /// Classify a non-success HTTP response (pure function)
    fn classify_error(status: StatusCode, body: &str) -> GenerationError {
        let envelope = serde_json::from_str::<GeminiErrorEnvelope>(body).ok();
        let upstream_status = envelope
            .as_ref()
            .and_then(|e| e.error.status.clone())
            .unwrap_or_default();
        let message = envelope
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| format!("HTTP {status}"));

        if upstream_status == "UNAVAILABLE" || status == StatusCode::SERVICE_UNAVAILABLE {
            return GenerationError::Unavailable(message);
        }

        let kind = ApiErrorKind::from_status(&upstream_status)
            .unwrap_or_else(|| ApiErrorKind::from_http_status(status.as_u16()));
        GenerationError::api(kind, message)
    }

    /// Extract answer text from a successful response (pure function)
    fn extract_text(response: GeminiResponse) -> Result<String, GenerationError> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(GenerationError::api(
                ApiErrorKind::Blocked,
                format!("prompt blocked: {reason}"),
            ));
        }

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            GenerationError::api(ApiErrorKind::Blocked, "no candidates returned")
        })?;

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.thought.unwrap_or(false))
            .filter_map(|p| p.text)
            .collect();

        if text.is_empty() {
            return Err(GenerationError::api(
                ApiErrorKind::Blocked,
                format!(
                    "candidate has no text (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = Self::convert_request(request);
        debug!(
            model = %request.model,
            prompt_chars = request.prompt_text.chars().count(),
            "Gemini generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let error_msg = sanitize_error_message(&format!(
                    "HTTP request failed: {} (is_connect: {}, is_timeout: {})",
                    e,
                    e.is_connect(),
                    e.is_timeout()
                ));
                warn!("Gemini network error: {}", error_msg);
                GenerationError::Uncategorized(error_msg)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error = Self::classify_error(status, &error_text);
            warn!(
                status = %status,
                classification = error.classification(),
                "Gemini API returned an error"
            );
            return Err(error);
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            GenerationError::Uncategorized(format!("failed to decode Gemini response: {e}"))
        })?;

        Self::extract_text(parsed)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: Option<String>,
    status: Option<String>,
}
