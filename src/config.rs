//! Relay configuration
//!
//! Configuration is read once at startup from a TOML file (or built-in
//! defaults) and is immutable afterwards. Credentials never live in the file:
//! the file names the environment variables that hold them.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main relay configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub notices: NoticesSection,
}

/// Chat bot section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotSection {
    /// Environment variable containing the bot token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Long-polling timeout in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u32,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_poll_timeout() -> u32 {
    30
}

/// Generation service section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// System instruction attached to every request
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    /// Generation API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HTTP timeout for a single generation call
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            system_instruction: default_system_instruction(),
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_system_instruction() -> String {
    "Always answer briefly and precisely. Put ** in front of every answer. \
     Reply only in the language the question was written in."
        .to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

/// Retry policy for transient upstream failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Total invocations allowed per message, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl RetrySection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

/// Inbound message filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterSection {
    /// Leading character that opts a message into processing
    #[serde(default = "default_marker")]
    pub marker: char,
    /// Forward a message consisting of the marker alone
    #[serde(default = "default_allow_empty_prompt")]
    pub allow_empty_prompt: bool,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            allow_empty_prompt: default_allow_empty_prompt(),
        }
    }
}

fn default_marker() -> char {
    '.'
}

fn default_allow_empty_prompt() -> bool {
    true
}

/// Fixed user-facing notices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoticesSection {
    #[serde(default = "default_unavailable_notice")]
    pub service_unavailable: String,
    #[serde(default = "default_overloaded_notice")]
    pub overloaded: String,
    #[serde(default = "default_api_error_notice")]
    pub api_error: String,
    #[serde(default = "default_generic_notice")]
    pub generic_error: String,
}

impl Default for NoticesSection {
    fn default() -> Self {
        Self {
            service_unavailable: default_unavailable_notice(),
            overloaded: default_overloaded_notice(),
            api_error: default_api_error_notice(),
            generic_error: default_generic_notice(),
        }
    }
}

fn default_unavailable_notice() -> String {
    "Sorry, the answering service is not available right now.".to_string()
}

fn default_overloaded_notice() -> String {
    "Sorry, the service is currently overloaded. Please try again in a few minutes.".to_string()
}

fn default_api_error_notice() -> String {
    "**API error:** a persistent error occurred while getting an answer.".to_string()
}

fn default_generic_notice() -> String {
    "Sorry, an unknown error occurred.".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Required credential not set: environment variable {0} is missing or empty")]
    MissingCredential(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Credentials resolved from the environment at startup
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: SecretString,
    pub api_key: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl RelayConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }

        if self.filter.marker.is_whitespace() {
            return Err(ConfigError::InvalidConfig(
                "filter.marker must not be whitespace".to_string(),
            ));
        }

        url::Url::parse(&self.llm.base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!("llm.base_url '{}': {e}", self.llm.base_url))
        })?;

        Ok(())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<SecretString, ConfigError> {
        match std::env::var(env_var_name) {
            Ok(value) if !value.trim().is_empty() => Ok(SecretString::new(value)),
            _ => Err(ConfigError::MissingCredential(env_var_name.to_string())),
        }
    }

    /// Get bot token from environment variable
    pub fn get_bot_token(&self) -> Result<SecretString, ConfigError> {
        Self::get_env_var_required(&self.bot.token_env)
    }

    /// Get generation API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<SecretString, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Resolve both credentials; either one missing is fatal
    pub fn resolve_credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            bot_token: self.get_bot_token()?,
            api_key: self.get_llm_api_key()?,
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let mut config = Self::default();
        config.retry.retry_delay_secs = 0;
        config.llm.system_instruction = "Answer briefly.".to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[bot]
token_env = "MY_BOT_TOKEN"
poll_timeout_secs = 20

[llm]
model = "gemini-2.0-flash"
api_key_env = "MY_GEMINI_KEY"
system_instruction = "Be terse."
base_url = "http://localhost:9999"
timeout_secs = 10

[retry]
max_attempts = 5
retry_delay_secs = 2

[filter]
marker = "!"
allow_empty_prompt = false

[notices]
overloaded = "busy"
"#;

        let config = RelayConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.bot.token_env, "MY_BOT_TOKEN");
        assert_eq!(config.bot.poll_timeout_secs, 20);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.llm.system_instruction, "Be terse.");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.filter.marker, '!');
        assert!(!config.filter.allow_empty_prompt);
        assert_eq!(config.notices.overloaded, "busy");
        assert_eq!(
            config.notices.generic_error,
            "Sorry, an unknown error occurred."
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.retry_delay_secs, 5);
        assert_eq!(config.filter.marker, '.');
        assert!(config.filter.allow_empty_prompt);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = RelayConfig::from_toml_str("[retry]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_model_rejected() {
        let result = RelayConfig::from_toml_str("[llm]\nmodel = \"  \"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = RelayConfig::from_toml_str("[llm]\nbase_url = \"not a url\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_whitespace_marker_rejected() {
        let result = RelayConfig::from_toml_str("[filter]\nmarker = \" \"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_credential_reports_variable_name() {
        let mut config = RelayConfig::default();
        config.bot.token_env = "DOTRELAY_UNIT_TEST_UNSET_TOKEN".to_string();

        let err = config.get_bot_token().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(ref name)
            if name == "DOTRELAY_UNIT_TEST_UNSET_TOKEN"));
    }

    #[test]
    fn test_credential_resolved_from_env() {
        std::env::set_var("DOTRELAY_UNIT_TEST_KEY", "secret-value");
        let mut config = RelayConfig::default();
        config.llm.api_key_env = "DOTRELAY_UNIT_TEST_KEY".to_string();

        let key = config.get_llm_api_key().unwrap();
        assert_eq!(key.expose_secret(), "secret-value");
        std::env::remove_var("DOTRELAY_UNIT_TEST_KEY");
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        std::env::set_var("DOTRELAY_UNIT_TEST_BLANK", "   ");
        let mut config = RelayConfig::default();
        config.llm.api_key_env = "DOTRELAY_UNIT_TEST_BLANK".to_string();

        assert!(config.get_llm_api_key().is_err());
        std::env::remove_var("DOTRELAY_UNIT_TEST_BLANK");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials {
            bot_token: SecretString::new("123:abc".to_string()),
            api_key: SecretString::new("AIza".to_string()),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("123:abc"));
        assert!(!debug.contains("AIza"));
    }
}
