use crate::constants::{DATA_PREFIX, DONE_SENTINEL, MAX_HELD_FRAGMENT};
use crate::frame::FrameDecoder;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental assistant text.
    Delta(String),
    /// The `[DONE]` sentinel; nothing after it is parsed.
    Done,
}

/// Interprets decoded lines as server-sent events carrying chat completion
/// chunks.
///
/// A `data: ` payload that is not valid JSON is held rather than dropped.
/// Continuation lines (non-blank, not a comment, no `data: ` prefix) are
/// appended to it and the joined text is retried. A blank line, a comment,
/// the next `data: ` line, the end of stream or the size guard abandons the
/// held fragment.
#[derive(Debug)]
pub struct EventParser {
    held: String,
    max_held: usize,
    finished: bool,
    dropped_fragments: usize,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self::with_max_held(MAX_HELD_FRAGMENT)
    }

    pub fn with_max_held(max_held: usize) -> Self {
        Self {
            held: String::new(),
            max_held,
            finished: false,
            dropped_fragments: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }

    pub fn dropped_fragments(&self) -> usize {
        self.dropped_fragments
    }

    pub fn parse_line(&mut self, line: &str) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        if self.is_holding() {
            if is_continuation(line) {
                self.held.push('\n');
                self.held.push_str(line);
                return self.retry_held();
            }
            self.drop_held("next frame arrived");
        }

        if line.trim().is_empty() || line.starts_with(':') {
            return None;
        }

        let payload = line.strip_prefix(DATA_PREFIX)?.trim();
        if payload == DONE_SENTINEL {
            tracing::debug!("[STREAM] End marker {} received", DONE_SENTINEL);
            self.finished = true;
            return Some(StreamEvent::Done);
        }

        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(chunk) => extract_delta(&chunk),
            Err(e) => {
                tracing::trace!("[STREAM] Holding incomplete payload ({}): {} bytes", e, payload.len());
                self.held.push_str(payload);
                self.enforce_limit();
                None
            }
        }
    }

    /// Abandons any held fragment once the byte stream is exhausted.
    pub fn finish(&mut self) {
        if self.is_holding() {
            self.drop_held("stream ended");
        }
    }

    fn retry_held(&mut self) -> Option<StreamEvent> {
        match serde_json::from_str::<serde_json::Value>(&self.held) {
            Ok(chunk) => {
                self.held.clear();
                extract_delta(&chunk)
            }
            Err(_) => {
                self.enforce_limit();
                None
            }
        }
    }

    fn enforce_limit(&mut self) {
        if self.held.len() > self.max_held {
            self.drop_held("size limit exceeded");
        }
    }

    fn drop_held(&mut self, reason: &str) {
        let snippet: String = self.held.chars().take(80).collect();
        tracing::warn!(
            "[STREAM] Dropping unparseable payload ({}; {} bytes): {}",
            reason,
            self.held.len(),
            snippet
        );
        self.held.clear();
        self.dropped_fragments += 1;
    }
}

fn is_continuation(line: &str) -> bool {
    !line.trim().is_empty() && !line.starts_with(':') && !line.starts_with("data:")
}

fn extract_delta(chunk: &serde_json::Value) -> Option<StreamEvent> {
    if let Some(err) = chunk.get("error") {
        tracing::warn!("[STREAM] Provider error inside stream: {}", err);
        return None;
    }
    match chunk
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        Some(text) if !text.is_empty() => Some(StreamEvent::Delta(text.to_string())),
        _ => None,
    }
}

/// Frame decoder and event parser over an async byte stream.
pub struct EventReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    lines: FramedRead<StreamReader<S, Bytes>, FrameDecoder>,
    parser: EventParser,
}

impl<S> EventReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub fn new(body: S) -> Self {
        Self {
            lines: FramedRead::new(StreamReader::new(body), FrameDecoder::new()),
            parser: EventParser::new(),
        }
    }

    /// Next event, `None` after `[DONE]` or once the bytes run out.
    /// Cancel-safe: all progress lives in `self`.
    pub async fn next_event(&mut self) -> Option<io::Result<StreamEvent>> {
        if self.parser.is_finished() {
            return None;
        }
        while let Some(line_result) = self.lines.next().await {
            match line_result {
                Ok(line) => {
                    if let Some(event) = self.parser.parse_line(&line) {
                        return Some(Ok(event));
                    }
                }
                Err(e) => {
                    tracing::error!("[STREAM] Line read error: {}", e);
                    return Some(Err(e));
                }
            }
        }
        self.parser.finish();
        None
    }
}
