//! Server-Sent Events (SSE) stream processing.
//!
//! Turns a chunked byte body into an ordered stream of text deltas. Bytes are
//! decoded incrementally, framed into lines, classified and parsed as JSON
//! provider events.
//!
//! SSE format:
//! ```text
//! : keepalive
//! data: {"type":"message_start","message":{}}
//!
//! data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}
//!
//! data: [DONE]
//! ```
//!
//! Framing happens before JSON parsing, so a record split across any number
//! of reads is reassembled and yields its delta. A complete line that still
//! fails to parse is dropped and the stream continues. `[DONE]` is ignored:
//! only the transport closing ends the stream.

use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

use crate::client::ClientError;
use crate::stream::{EventStream, StreamEvent};

/// Extension trait for `reqwest::Response` to read its body as an event stream.
///
/// # Example
/// ```ignore
/// use coachflow::sse::SSEResponseExt;
/// use coachflow::stream::StreamEvent;
///
/// let response = client.post(url).send().await?;
/// let mut events = response.sse();
/// while let Some(event) = events.next().await {
///     match event {
///         StreamEvent::Delta(text) => print!("{}", text),
///         StreamEvent::Done => break,
///         StreamEvent::Error(err) => return Err(err.into()),
///     }
/// }
/// ```
pub trait SSEResponseExt {
    fn sse(self) -> EventStream;
}

impl SSEResponseExt for reqwest::Response {
    fn sse(self) -> EventStream {
        read_events(self.bytes_stream())
    }
}

/// Read a chunked byte stream as a stream of [`StreamEvent`]s.
///
/// The first transport error ends the stream with a single
/// `StreamEvent::Error`; the body is not polled again afterwards. The
/// returned stream is fused: after its terminal item it yields `None` on
/// every poll.
pub fn read_events<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let reader = Reader {
        body: Box::pin(body),
        decoder: Utf8Decoder::default(),
        lines: LineBuffer::default(),
        ready: VecDeque::new(),
        phase: Phase::Reading,
    };

    Box::pin(stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(delta) = reader.ready.pop_front() {
                return Some((StreamEvent::Delta(delta), reader));
            }

            match reader.phase {
                Phase::Finished => return None,
                Phase::Drained => {
                    reader.phase = Phase::Finished;
                    return Some((StreamEvent::Done, reader));
                }
                Phase::Reading => {
                    let next = reader.body.next().await;
                    match next {
                        Some(Ok(chunk)) => {
                            let text = reader.decoder.decode(chunk.as_ref());
                            reader.lines.push(&text);
                            reader.process_complete_lines();
                        }
                        Some(Err(err)) => {
                            reader.phase = Phase::Finished;
                            return Some((StreamEvent::Error(err.into()), reader));
                        }
                        None => {
                            if reader.decoder.has_pending() {
                                debug!("stream ended inside a UTF-8 sequence");
                            }
                            let tail = reader.decoder.finish();
                            reader.lines.push(&tail);
                            reader.process_complete_lines();
                            let residual = reader.lines.take_remainder();
                            reader.process_line(&residual);
                            reader.phase = Phase::Drained;
                        }
                    }
                }
            }
        }
    })
    .fuse())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Drained,
    Finished,
}

struct Reader<S> {
    body: Pin<Box<S>>,
    decoder: Utf8Decoder,
    lines: LineBuffer,
    ready: VecDeque<String>,
    phase: Phase,
}

impl<S> Reader<S> {
    fn process_complete_lines(&mut self) {
        for line in self.lines.drain_lines() {
            self.process_line(&line);
        }
    }

    fn process_line(&mut self, line: &str) {
        if let Some(delta) = extract_delta(line) {
            self.ready.push_back(delta);
        }
    }
}

/// Incremental UTF-8 decoder.
///
/// Keeps an incomplete multi-byte sequence at the end of a chunk until the
/// next chunk completes it. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `chunk`, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut offset = 0;

        while offset < self.pending.len() {
            match std::str::from_utf8(&self.pending[offset..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    offset = self.pending.len();
                }
                Err(err) => {
                    let valid_end = offset + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[offset..valid_end]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            offset = valid_end + len;
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            offset = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..offset);
        out
    }

    /// Flush at end of input. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Accumulates decoded text and hands out complete lines.
///
/// After every [`drain_lines`](Self::drain_lines) the buffer holds at most
/// one partial line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Remove and return every newline-terminated line, in order, without
    /// the terminator. A trailing `\r` is stripped.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let complete: String = self.buffer.drain(..=last_newline).collect();
        complete[..complete.len() - 1]
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Take whatever partial line is left, emptying the buffer.
    pub fn take_remainder(&mut self) -> String {
        let rest = std::mem::take(&mut self.buffer);
        match rest.strip_suffix('\r') {
            Some(stripped) => stripped.to_string(),
            None => rest,
        }
    }

    #[cfg(test)]
    fn partial(&self) -> &str {
        &self.buffer
    }
}

/// A single line of the wire protocol, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    /// Empty line (event separator).
    Blank,
    /// `: ...` comment or keepalive.
    Comment,
    /// `data: [DONE]`.
    Sentinel,
    /// `data: <payload>`, payload trimmed.
    Data(&'a str),
    /// Any other field (`event:`, `id:`, `retry:`) or unprefixed text.
    Other,
}

/// Classify one line (without its line terminator).
///
/// # Example
/// ```
/// use coachflow::sse::{classify_line, Record};
///
/// assert_eq!(classify_line(""), Record::Blank);
/// assert_eq!(classify_line(": ping"), Record::Comment);
/// assert_eq!(classify_line("data: [DONE]"), Record::Sentinel);
/// assert_eq!(classify_line("data: {}"), Record::Data("{}"));
/// assert_eq!(classify_line("event: message_stop"), Record::Other);
/// ```
pub fn classify_line(line: &str) -> Record<'_> {
    if line.trim().is_empty() {
        return Record::Blank;
    }
    if line.starts_with(':') {
        return Record::Comment;
    }
    match parse_sse_line(line) {
        Some(data) if is_done_marker(data) => Record::Sentinel,
        Some(data) => Record::Data(data),
        None => Record::Other,
    }
}

/// Parse an SSE line to extract the data portion.
///
/// # Example
/// ```
/// use coachflow::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "invalid";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").map(|s| s.trim())
}

/// Check if an SSE data payload is the `[DONE]` sentinel.
///
/// # Example
/// ```
/// use coachflow::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

/// Provider event payload, tagged by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProviderEvent {
    MessageStart {},
    ContentBlockDelta { delta: DeltaBody },
    MessageStop {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    #[serde(default)]
    text: Option<String>,
}

fn extract_delta(line: &str) -> Option<String> {
    let Record::Data(payload) = classify_line(line) else {
        return None;
    };

    match serde_json::from_str::<ProviderEvent>(payload) {
        Ok(ProviderEvent::ContentBlockDelta { delta }) => delta.text,
        Ok(ProviderEvent::MessageStart {}) | Ok(ProviderEvent::MessageStop {}) => None,
        Ok(ProviderEvent::Other) => None,
        Err(err) => {
            debug!(error = %err, "dropping malformed stream record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const HI: &str = "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hi\"}}\n";
    const THERE: &str = "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\" there\"}}\n";

    fn chunks(parts: &[&[u8]]) -> Vec<Result<Bytes, ClientError>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect()
    }

    async fn run(items: Vec<Result<Bytes, ClientError>>) -> Vec<StreamEvent> {
        read_events(stream::iter(items)).collect().await
    }

    fn deltas(events: &[StreamEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| e.as_delta().map(str::to_string))
            .collect()
    }

    fn terminal_count(events: &[StreamEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello"), Some("hello"));
        assert_eq!(parse_sse_line("data:   spaces  "), Some("spaces"));
        assert_eq!(parse_sse_line("invalid"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("   "), Record::Blank);
        assert_eq!(classify_line(":"), Record::Comment);
        assert_eq!(classify_line("data:  [DONE] "), Record::Sentinel);
        assert_eq!(classify_line("id: 7"), Record::Other);
        assert_eq!(classify_line("data: {\"a\":1} "), Record::Data("{\"a\":1}"));
    }

    #[test]
    fn test_decoder_holds_split_code_point() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "é✓".as_bytes();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..3]), "é");
        assert_eq!(decoder.decode(&bytes[3..]), "✓");
        assert!(!decoder.has_pending());
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(&[0xE2, 0x9C]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_line_buffer_keeps_one_partial_line() {
        let mut buffer = LineBuffer::default();
        buffer.push("one\r\ntwo\nthr");
        assert_eq!(buffer.drain_lines(), vec!["one", "two"]);
        assert_eq!(buffer.partial(), "thr");

        buffer.push("ee\n\n");
        assert_eq!(buffer.drain_lines(), vec!["three", ""]);
        assert_eq!(buffer.partial(), "");

        buffer.push("tail\r");
        assert!(buffer.drain_lines().is_empty());
        assert_eq!(buffer.take_remainder(), "tail");
    }

    #[tokio::test]
    async fn test_scenario_a_two_deltas_then_done() {
        let events = run(chunks(&[HI.as_bytes(), THERE.as_bytes()])).await;

        assert_eq!(deltas(&events), vec!["Hi", " there"]);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_scenario_b_json_split_across_reads() {
        let events = run(chunks(&[
            "data: {\"type\":\"content_block_delta\",".as_bytes(),
            "\"delta\":{\"text\":\"Hi\"}}\n".as_bytes(),
        ]))
        .await;

        assert_eq!(deltas(&events), vec!["Hi"]);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_scenario_c_abort_after_one_delta() {
        let items = vec![
            Ok(Bytes::from_static(HI.as_bytes())),
            Err(ClientError::Transport("connection reset".to_string())),
            Ok(Bytes::from_static(THERE.as_bytes())),
        ];
        let events = run(items).await;

        assert_eq!(events.len(), 2);
        assert_eq!(deltas(&events), vec!["Hi"]);
        assert!(matches!(events[1], StreamEvent::Error(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_done_sentinel_does_not_end_stream() {
        let events = run(chunks(&["data: [DONE]\n".as_bytes(), THERE.as_bytes()])).await;

        assert_eq!(deltas(&events), vec![" there"]);
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_dropped() {
        let events = run(chunks(&["data: {not json\n".as_bytes(), HI.as_bytes()])).await;

        assert_eq!(deltas(&events), vec!["Hi"]);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_non_text_events_are_silent() {
        let body = concat!(
            ": keepalive\n",
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n",
            "\n",
            "data: {\"type\":\"ping\"}\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\"}}\n",
            "data: {\"type\":\"message_stop\"}\n",
        );
        let events = run(chunks(&[body.as_bytes()])).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let line = HI.trim_end();
        let events = run(chunks(&[line.as_bytes()])).await;

        assert_eq!(deltas(&events), vec!["Hi"]);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_polling_after_terminal_yields_none() {
        let mut events = read_events(stream::iter(chunks(&[HI.as_bytes()])));

        assert!(matches!(events.next().await, Some(StreamEvent::Delta(_))));
        assert!(matches!(events.next().await, Some(StreamEvent::Done)));
        for _ in 0..3 {
            assert!(events.next().await.is_none());
        }

        let mut events = read_events(stream::iter(vec![Err::<Bytes, _>(ClientError::StreamCancelled)]));
        assert!(matches!(events.next().await, Some(StreamEvent::Error(_))));
        for _ in 0..3 {
            assert!(events.next().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_done() {
        let events = run(Vec::new()).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_chunk_boundary_invariance() {
        let body = format!(
            "{}: ping\n{}data: {}\r\n",
            HI, THERE, "{\"type\":\"content_block_delta\",\"delta\":{\"text\":\" café ✓ 日本\"}}"
        );
        let bytes = body.as_bytes();

        let whole = deltas(&run(chunks(&[bytes])).await);
        assert_eq!(whole, vec!["Hi", " there", " café ✓ 日本"]);

        // Every two-way split, including inside multi-byte sequences.
        for split in 1..bytes.len() {
            let events = run(chunks(&[&bytes[..split], &bytes[split..]])).await;
            assert_eq!(deltas(&events), whole, "split at byte {}", split);
            assert_eq!(terminal_count(&events), 1);
        }

        let per_byte: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(deltas(&run(chunks(&per_byte)).await), whole);
    }
}
