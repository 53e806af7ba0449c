//! Accumulates a streamed reply and periodically saves it.
//!
//! The reader only emits deltas. `Transcript` sits on the consuming side,
//! builds up the full text and hands snapshots of it to a [`TranscriptSink`]
//! (a database row, a file, ...). Sink failures are logged and never abort
//! the stream.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::warn;

use crate::client::ClientError;
use crate::stream::StreamEvent;

const DEFAULT_SNAPSHOT_EVERY: usize = 20;

#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Durable destination for transcript snapshots.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Persist `text`, the whole reply accumulated so far.
    async fn snapshot(&self, text: &str) -> Result<(), TranscriptError>;
}

/// Running transcript of one streamed reply.
pub struct Transcript<K> {
    sink: K,
    every: usize,
    text: String,
    unsaved: usize,
}

impl<K: TranscriptSink> Transcript<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            every: DEFAULT_SNAPSHOT_EVERY,
            text: String::new(),
            unsaved: 0,
        }
    }

    /// Snapshot after every `n` deltas. Zero is treated as one.
    pub fn snapshot_every(mut self, n: usize) -> Self {
        self.every = n.max(1);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub async fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.unsaved += 1;
        if self.unsaved >= self.every {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if let Err(err) = self.sink.snapshot(&self.text).await {
            warn!(error = %err, chars = self.text.len(), "transcript snapshot failed");
        }
        self.unsaved = 0;
    }

    /// Drain `stream` into the transcript.
    ///
    /// On success a final snapshot is taken and the full text returned. On a
    /// stream error any unsaved text is flushed before the error is returned.
    pub async fn consume<S>(mut self, stream: S) -> Result<String, ClientError>
    where
        S: Stream<Item = StreamEvent>,
    {
        let mut stream = std::pin::pin!(stream);

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Delta(delta) => self.push(&delta).await,
                StreamEvent::Done => break,
                StreamEvent::Error(err) => {
                    if self.unsaved > 0 {
                        self.flush().await;
                    }
                    return Err(err);
                }
            }
        }

        self.flush().await;
        Ok(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemorySink {
        snapshots: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl TranscriptSink for MemorySink {
        async fn snapshot(&self, text: &str) -> Result<(), TranscriptError> {
            if self.fail {
                return Err(TranscriptError::Storage("disk full".to_string()));
            }
            self.snapshots.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn deltas(parts: &[&str]) -> Vec<StreamEvent> {
        parts
            .iter()
            .map(|p| StreamEvent::Delta(p.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_snapshots_every_n_and_on_completion() {
        let sink = MemorySink::default();
        let mut events = deltas(&["a", "b", "c", "d", "e"]);
        events.push(StreamEvent::Done);

        let text = Transcript::new(sink.clone())
            .snapshot_every(2)
            .consume(stream::iter(events))
            .await
            .unwrap();

        assert_eq!(text, "abcde");
        assert_eq!(*sink.snapshots.lock().unwrap(), vec!["ab", "abcd", "abcde"]);
    }

    #[tokio::test]
    async fn test_error_saves_partial_text() {
        let sink = MemorySink::default();
        let mut events = deltas(&["a", "b", "c"]);
        events.push(StreamEvent::Error(ClientError::Transport("reset".to_string())));

        let result = Transcript::new(sink.clone())
            .snapshot_every(2)
            .consume(stream::iter(events))
            .await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(*sink.snapshots.lock().unwrap(), vec!["ab", "abc"]);
    }

    #[tokio::test]
    async fn test_error_without_unsaved_text_skips_snapshot() {
        let sink = MemorySink::default();
        let events = vec![StreamEvent::Error(ClientError::StreamCancelled)];

        let result = Transcript::new(sink.clone()).consume(stream::iter(events)).await;

        assert!(result.is_err());
        assert!(sink.snapshots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_abort() {
        let sink = MemorySink {
            fail: true,
            ..Default::default()
        };
        let mut events = deltas(&["x", "y"]);
        events.push(StreamEvent::Done);

        let text = Transcript::new(sink)
            .snapshot_every(1)
            .consume(stream::iter(events))
            .await
            .unwrap();
        assert_eq!(text, "xy");
    }
}
