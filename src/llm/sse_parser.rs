// ABOUTME: Line-buffering parser for Server-Sent Events from the generation service
// ABOUTME: Handles payloads split across network chunks and many events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Upstream SSE parsing
//!
//! Network chunks do not line up with SSE events: one chunk may carry
//! several events and one JSON payload may be split over two chunks.
//! [`SseLineBuffer`] accumulates bytes and only yields complete `data:`
//! lines. [`create_sse_stream`] wraps a response byte stream with the buffer
//! and a provider-specific payload parser.

use std::mem;

use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::warn;

use super::{ChatStream, StreamChunk};
use crate::errors::AppError;

/// A parsed upstream SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the prefix stripped
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

/// Accumulates bytes until complete lines are available
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every event completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        // Split on raw bytes so multi-byte characters spanning chunks survive
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the byte stream has ended
    pub fn flush(&mut self) -> Option<SseEvent> {
        let rest = mem::take(&mut self.pending);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    // Comments, blank separators and event:/id:/retry: fields carry no payload
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim().is_empty() {
        return None;
    }
    if data.trim() == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_owned()))
}

/// Turn a raw upstream byte stream into a [`ChatStream`]
///
/// `parse_data` converts one JSON payload into a chunk; returning `None`
/// skips metadata-only payloads. Empty non-final deltas are dropped. The
/// stream ends after `[DONE]` even if the connection stays open.
pub fn create_sse_stream<S, F>(byte_stream: S, parse_data: F, provider_name: &'static str) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&str) -> Option<Result<StreamChunk, AppError>> + Send + Sync + 'static,
{
    let chunks = stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut buffer = SseLineBuffer::new();

        'read: loop {
            let (events, finished) = match byte_stream.next().await {
                Some(Ok(bytes)) => (buffer.feed(&bytes), false),
                Some(Err(e)) => {
                    warn!(provider = provider_name, error = %e, "Upstream stream read failed");
                    yield Err(AppError::upstream_generation(format!(
                        "{provider_name} stream read error: {e}"
                    )));
                    break 'read;
                }
                None => (buffer.flush().into_iter().collect::<Vec<_>>(), true),
            };

            for event in events {
                match event {
                    SseEvent::Data(payload) => {
                        if let Some(result) = parse_data(&payload) {
                            let failed = result.is_err();
                            yield result;
                            if failed {
                                break 'read;
                            }
                        }
                    }
                    SseEvent::Done => {
                        yield Ok(StreamChunk::done("stop"));
                        break 'read;
                    }
                }
            }

            if finished {
                break 'read;
            }
        }
    };

    Box::pin(chunks.filter(|result| {
        let keep = result
            .as_ref()
            .map_or(true, |chunk| !chunk.delta.is_empty() || chunk.is_final || chunk.usage.is_some());
        futures_util::future::ready(keep)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut buffer = SseLineBuffer::new();
        let events = buffer.feed(b"data: {\"a\":1}\n\ndata: {\"a\":2}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data("{\"a\":1}".into()),
                SseEvent::Data("{\"a\":2}".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn test_payload_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data: {\"content\":\"hel").is_empty());
        let events = buffer.feed(b"lo\"}\r\n\r\n");
        assert_eq!(events, vec![SseEvent::Data("{\"content\":\"hello\"}".into())]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        let line = "data: caf\u{e9}\n".as_bytes();
        let split = line.len() - 2;
        assert!(buffer.feed(&line[..split]).is_empty());
        assert_eq!(buffer.feed(&line[split..]), vec![SseEvent::Data("caf\u{e9}".into())]);
    }

    #[test]
    fn test_comments_and_fields_are_ignored() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b": keep-alive\nevent: ping\nid: 7\nretry: 100\n").is_empty());
    }

    #[test]
    fn test_flush_parses_unterminated_tail() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data:{\"x\":true}").is_empty());
        assert_eq!(buffer.flush(), Some(SseEvent::Data("{\"x\":true}".into())));
        assert_eq!(buffer.flush(), None);
    }
}
