//! # coachflow - backend pieces for a coach onboarding product
//!
//! The serverless side of a guided onboarding app: an LLM chat proxy that
//! streams replies back as text deltas, transcript snapshots of those
//! replies, and a password check with escalating lockouts.
//!
//! ## Architecture
//!
//! - **`sse`**: incremental event-stream reader. Decodes a chunked byte body,
//!   frames lines, parses provider events and yields text deltas.
//! - **`stream`**: the `StreamEvent` item type (`Delta`, then exactly one
//!   `Done` or `Error`) and callback/collect consumers.
//! - **`client`** / **`providers`**: the request layer. Builds the provider
//!   request, attaches authentication and turns non-2xx responses into an
//!   error before any streaming starts.
//! - **`transcript`**: accumulates deltas and snapshots them to a sink.
//! - **`lockout`**: fixed-window attempt counting over a caller-owned store.
//!
//! ## Example
//! ```no_run
//! use coachflow::client::{Client, StreamingClient};
//! use coachflow::model::Message;
//! use coachflow::options::{AnthropicModel, HttpTransport, ModelOptions, TransportOptions};
//! use coachflow::providers::AnthropicClient;
//! use coachflow::stream::StreamEvent;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model_options = ModelOptions::new(AnthropicModel::default())
//!         .with_model("claude-sonnet-4-5".to_string())
//!         .with_max_tokens(512);
//!     let transport_options = TransportOptions::new(HttpTransport::from_env("ANTHROPIC_API_KEY")?);
//!
//!     let client = AnthropicClient::new(model_options, transport_options);
//!     let mut events = client.chat_stream(vec![Message::user("Hello!")]).await?;
//!
//!     while let Some(event) = events.next().await {
//!         match event {
//!             StreamEvent::Delta(text) => print!("{}", text),
//!             StreamEvent::Done => break,
//!             StreamEvent::Error(err) => return Err(err.into()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod lockout;
pub mod model;
pub mod options;
pub mod providers;
pub mod sse;
pub mod stream;
pub mod transcript;

// Re-exports for convenience
pub use client::{Client, ClientError, StreamingClient};
pub use model::{Message, Role};
pub use stream::{StreamEvent, StreamHandler};
