//! Streaming chat example: prints deltas as they arrive and keeps a
//! transcript.
//!
//! Run with:
//! ```bash
//! export ANTHROPIC_API_KEY="your-api-key"
//! RUST_LOG=coachflow=debug cargo run --example anthropic_streaming
//! ```

use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use coachflow::client::{Client, StreamingClient};
use coachflow::model::Message;
use coachflow::options::{AnthropicModel, HttpTransport, ModelOptions, TransportOptions};
use coachflow::providers::AnthropicClient;
use coachflow::stream::{drive, StreamHandler};
use coachflow::transcript::{Transcript, TranscriptError, TranscriptSink};
use coachflow::ClientError;

struct Printer;

impl StreamHandler for Printer {
    fn on_delta(&mut self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn on_done(&mut self) {
        println!("\n\n=== Stream Complete ===");
    }

    fn on_error(&mut self, error: ClientError) {
        eprintln!("\nError in stream: {}", error);
    }
}

struct StderrSink;

#[async_trait]
impl TranscriptSink for StderrSink {
    async fn snapshot(&self, text: &str) -> Result<(), TranscriptError> {
        eprintln!("[snapshot: {} chars]", text.chars().count());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let model_options = ModelOptions::new(AnthropicModel::default())
        .with_model("claude-sonnet-4-5".to_string())
        .with_instructions("You help independent coaches set up their booking page.".to_string())
        .with_max_tokens(512);

    let transport_options = TransportOptions::new(HttpTransport::from_env("ANTHROPIC_API_KEY")?)
        .with_timeout(Duration::from_secs(60));

    let client = AnthropicClient::new(model_options, transport_options);

    println!("Streaming response from Anthropic...\n");
    let stream = client
        .chat_stream(vec![Message::user("Write a two-line welcome message for new clients.")])
        .await?;
    drive(stream, &mut Printer).await;

    println!("\nStreaming again into a transcript...\n");
    let stream = client
        .chat_stream(vec![Message::user("Suggest three names for a coaching package.")])
        .await?;
    let text = Transcript::new(StderrSink)
        .snapshot_every(10)
        .consume(stream)
        .await?;
    println!("{}", text);

    Ok(())
}
