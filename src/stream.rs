//! Streaming event types and consumers.
//!
//! A chat stream is a `Stream<Item = StreamEvent>`: zero or more `Delta`
//! items followed by exactly one terminal `Done` or `Error`, after which the
//! stream yields `None`.

use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::client::ClientError;

/// One item of a chat response stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// An incremental fragment of generated text.
    Delta(String),

    /// The transport closed normally and all buffered records were processed.
    Done,

    /// The transport failed. No further items follow.
    Error(ClientError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }

    pub fn as_delta(&self) -> Option<&str> {
        match self {
            StreamEvent::Delta(text) => Some(text),
            _ => None,
        }
    }
}

/// Boxed event stream returned by streaming clients.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Callback-style consumer for a chat stream.
///
/// Used with [`drive`]. Exactly one of `on_done` or `on_error` is called,
/// once, after all `on_delta` calls.
pub trait StreamHandler {
    fn on_delta(&mut self, text: &str);

    fn on_done(&mut self);

    fn on_error(&mut self, error: ClientError);
}

/// Feed a stream into a [`StreamHandler`] until its terminal event.
///
/// A stream that ends without a terminal event is treated as done.
pub async fn drive<S, H>(stream: S, handler: &mut H)
where
    S: Stream<Item = StreamEvent>,
    H: StreamHandler + ?Sized,
{
    let mut stream = std::pin::pin!(stream);

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Delta(text) => handler.on_delta(&text),
            StreamEvent::Done => {
                handler.on_done();
                return;
            }
            StreamEvent::Error(err) => {
                handler.on_error(err);
                return;
            }
        }
    }

    handler.on_done();
}

/// Concatenate every delta of a stream into one string.
pub async fn collect_text<S>(stream: S) -> Result<String, ClientError>
where
    S: Stream<Item = StreamEvent>,
{
    let mut stream = std::pin::pin!(stream);
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Delta(delta) => text.push_str(&delta),
            StreamEvent::Done => break,
            StreamEvent::Error(err) => return Err(err),
        }
    }

    Ok(text)
}
