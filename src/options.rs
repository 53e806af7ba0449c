//! Generic options structures for model and transport configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Generic model options containing common model behavior parameters
/// and provider-specific model configuration.
///
/// # Example
/// ```rust
/// use coachflow::options::{AnthropicModel, ModelOptions};
///
/// let options = ModelOptions::new(AnthropicModel::default())
///     .with_model("claude-sonnet-4-5".to_string())
///     .with_instructions("You are a friendly onboarding assistant.".to_string())
///     .with_max_tokens(512);
/// assert_eq!(options.max_tokens, Some(512));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelOptions<T> {
    /// Model identifier (e.g., "claude-sonnet-4-5")
    pub model: Option<String>,

    /// System instructions passed to the model
    pub instructions: Option<String>,

    /// Temperature for sampling
    pub temperature: Option<f32>,

    /// Top-p (nucleus) sampling parameter
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Provider-specific model options
    pub provider: T,
}

/// Generic transport options: a request timeout plus provider-specific
/// transport configuration.
#[derive(Debug, Clone)]
pub struct TransportOptions<T> {
    pub timeout: Option<Duration>,

    pub provider: T,
}

/// HTTP-specific transport options.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    /// API key for authentication
    pub api_key: Option<SecretString>,

    /// Base URL for API endpoints
    pub base_url: Option<String>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: None,
            proxy: None,
            extra_headers: None,
        }
    }

    /// Read the API key from the environment variable `var`.
    ///
    /// An unset or empty variable is a configuration error.
    pub fn from_env(var: &str) -> Result<Self, ClientError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(ClientError::Config(format!(
                "{} environment variable must be set",
                var
            ))),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

/// Anthropic-specific model options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnthropicModel {
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    /// Value of the `anthropic-version` header; a pinned default is used when unset.
    pub anthropic_version: Option<String>,
}

impl<T> ModelOptions<T> {
    pub fn new(provider: T) -> Self {
        Self {
            model: None,
            instructions: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            provider,
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_instructions(mut self, instructions: String) -> Self {
        self.instructions = Some(instructions);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl<T> TransportOptions<T> {
    pub fn new(provider: T) -> Self {
        Self {
            timeout: None,
            provider,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = SecretString::from("sk-ant-123");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.expose_secret(), "sk-ant-123");
    }

    #[test]
    fn test_from_env_reads_key() {
        std::env::set_var("COACHFLOW_TEST_KEY_PRESENT", "sk-test");
        let transport = HttpTransport::from_env("COACHFLOW_TEST_KEY_PRESENT").unwrap();
        assert_eq!(transport.api_key.unwrap().expose_secret(), "sk-test");
    }

    #[test]
    fn test_from_env_missing_key() {
        std::env::remove_var("COACHFLOW_TEST_KEY_MISSING");
        let err = HttpTransport::from_env("COACHFLOW_TEST_KEY_MISSING").unwrap_err();
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("COACHFLOW_TEST_KEY_MISSING")));
    }

    #[test]
    fn test_with_header_accumulates() {
        let transport = HttpTransport::new("k")
            .with_header("x-a".to_string(), "1".to_string())
            .with_header("x-b".to_string(), "2".to_string());
        assert_eq!(transport.extra_headers.unwrap().len(), 2);
    }
}
