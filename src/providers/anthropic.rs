//! Anthropic Messages API client.
//!
//! Implements `Client` and `StreamingClient` for the streaming Messages
//! endpoint. See: <https://docs.anthropic.com/en/api/messages-streaming>

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{Client, ClientError, StreamingClient};
use crate::http::{add_extra_headers, build_http_client, ensure_success};
use crate::model::Message;
use crate::options::{AnthropicModel, HttpTransport, ModelOptions, TransportOptions};
use crate::sse::SSEResponseExt;
use crate::stream::{collect_text, EventStream};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic client using HTTP transport.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    model_options: ModelOptions<AnthropicModel>,
    transport_options: TransportOptions<HttpTransport>,
}

impl AnthropicClient {
    fn build_request(
        messages: Vec<Message>,
        model_options: &ModelOptions<AnthropicModel>,
        transport_options: &TransportOptions<HttpTransport>,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let api_key = transport_options
            .provider
            .api_key
            .as_ref()
            .ok_or_else(|| ClientError::Config("API key is required".to_string()))?;

        let model = model_options
            .model
            .clone()
            .ok_or_else(|| ClientError::Config("Model must be specified".to_string()))?;

        let api_base = transport_options
            .provider
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');
        let url = format!("{}/v1/messages", api_base);

        let version = model_options
            .provider
            .anthropic_version
            .as_deref()
            .unwrap_or(ANTHROPIC_VERSION);

        let api_key_header = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|_| ClientError::Config("Invalid API key".to_string()))?;

        let request_body = AnthropicRequest::new(messages, model_options, model);
        debug!(
            model = %request_body.model,
            messages = request_body.messages.len(),
            "sending streaming chat request"
        );

        let http_client = build_http_client(transport_options)?;
        let mut req = http_client
            .post(&url)
            .header("x-api-key", api_key_header)
            .header("anthropic-version", version)
            .header(CONTENT_TYPE, "application/json");

        req = add_extra_headers(req, &transport_options.provider.extra_headers);

        Ok(req.json(&request_body))
    }

    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        if let Ok(error_resp) = serde_json::from_str::<AnthropicErrorResponse>(body) {
            ClientError::ProviderError(format!(
                "Anthropic error ({}): {}",
                error_resp.error.error_type, error_resp.error.message
            ))
        } else {
            ClientError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            }
        }
    }
}

#[async_trait]
impl Client for AnthropicClient {
    type ModelProvider = AnthropicModel;
    type TransportProvider = HttpTransport;

    async fn request(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<Message, ClientError> {
        let stream = Self::request_stream(messages, model_options, transport_options).await?;
        let text = collect_text(stream).await?;
        Ok(Message::assistant(text))
    }

    fn new(
        model_options: ModelOptions<Self::ModelProvider>,
        transport_options: TransportOptions<Self::TransportProvider>,
    ) -> Self {
        Self {
            model_options,
            transport_options,
        }
    }

    fn model_options(&self) -> &ModelOptions<Self::ModelProvider> {
        &self.model_options
    }

    fn transport_options(&self) -> &TransportOptions<Self::TransportProvider> {
        &self.transport_options
    }
}

#[async_trait]
impl StreamingClient for AnthropicClient {
    async fn request_stream(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<EventStream, ClientError> {
        let req = Self::build_request(messages, model_options, transport_options)?;
        let response = req.send().await?;
        let response = ensure_success(response, Self::handle_error_response).await?;
        Ok(response.sse())
    }
}

// --- Request Types ---

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

impl AnthropicRequest {
    fn new(messages: Vec<Message>, model_options: &ModelOptions<AnthropicModel>, model: String) -> Self {
        let messages = messages
            .into_iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| AnthropicMessage {
                role: m.role.as_str(),
                content: m.content,
            })
            .collect();

        AnthropicRequest {
            model,
            messages,
            max_tokens: model_options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: model_options.instructions.clone(),
            temperature: model_options.temperature,
            top_p: model_options.top_p,
            top_k: model_options.provider.top_k,
            stop_sequences: model_options.provider.stop_sequences.clone(),
            stream: true,
        }
    }
}

// --- Error Types ---

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
