//! Core client traits and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Message;
use crate::options::{ModelOptions, TransportOptions};
use crate::stream::EventStream;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Stream cancelled")]
    StreamCancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Main client trait for chat providers.
///
/// Each provider defines its own model and transport option types and a
/// static `request` that takes explicit options. The instance methods use
/// the defaults stored in the client.
///
/// # Example
/// ```rust,ignore
/// impl Client for MyClient {
///     type ModelProvider = MyModel;
///     type TransportProvider = HttpTransport;
///
///     async fn request(
///         messages: Vec<Message>,
///         model_options: &ModelOptions<Self::ModelProvider>,
///         transport_options: &TransportOptions<Self::TransportProvider>,
///     ) -> Result<Message, ClientError> {
///         // Implementation
///     }
///
///     fn new(
///         model_options: ModelOptions<Self::ModelProvider>,
///         transport_options: TransportOptions<Self::TransportProvider>,
///     ) -> Self {
///         Self { model_options, transport_options }
///     }
///
///     fn model_options(&self) -> &ModelOptions<Self::ModelProvider> {
///         &self.model_options
///     }
///
///     fn transport_options(&self) -> &TransportOptions<Self::TransportProvider> {
///         &self.transport_options
///     }
/// }
/// ```
#[async_trait]
pub trait Client: Send + Sync + Sized {
    /// Provider-specific model options type.
    type ModelProvider: Send + Sync;

    /// Provider-specific transport options type.
    type TransportProvider: Send + Sync;

    /// Send a request with explicit options and return the complete
    /// assistant message.
    async fn request(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<Message, ClientError>;

    /// Create a new client instance with the given default options.
    fn new(
        model_options: ModelOptions<Self::ModelProvider>,
        transport_options: TransportOptions<Self::TransportProvider>,
    ) -> Self;

    fn model_options(&self) -> &ModelOptions<Self::ModelProvider>;

    fn transport_options(&self) -> &TransportOptions<Self::TransportProvider>;

    /// Send a request using the client's default options.
    async fn chat(&self, messages: Vec<Message>) -> Result<Message, ClientError> {
        Self::request(messages, self.model_options(), self.transport_options()).await
    }

    /// Send a request overriding the default model options.
    async fn chat_with_options(
        &self,
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
    ) -> Result<Message, ClientError> {
        Self::request(messages, model_options, self.transport_options()).await
    }
}

/// Extension trait for streaming support.
///
/// `request_stream` resolves only once the provider has answered with a
/// success status. Connection failures and non-2xx responses are returned
/// here as an error, so the event stream it hands back always starts from a
/// readable body.
#[async_trait]
pub trait StreamingClient: Client {
    /// Static streaming method.
    ///
    /// The returned stream yields any number of `StreamEvent::Delta` items
    /// followed by exactly one `Done` or `Error`.
    async fn request_stream(
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
        transport_options: &TransportOptions<Self::TransportProvider>,
    ) -> Result<EventStream, ClientError>;

    /// Stream a response using the client's default options.
    async fn chat_stream(&self, messages: Vec<Message>) -> Result<EventStream, ClientError> {
        Self::request_stream(
            messages,
            <Self as Client>::model_options(self),
            <Self as Client>::transport_options(self),
        )
        .await
    }

    /// Stream a response overriding the default model options.
    async fn chat_stream_with_options(
        &self,
        messages: Vec<Message>,
        model_options: &ModelOptions<Self::ModelProvider>,
    ) -> Result<EventStream, ClientError> {
        Self::request_stream(
            messages,
            model_options,
            <Self as Client>::transport_options(self),
        )
        .await
    }
}
