//! Incremental line splitter for upstream response bodies.
//!
//! Network reads arrive at arbitrary byte boundaries. Lines are cut on `\n`
//! (a trailing `\r` is dropped) and decoded only once complete, so multi-byte
//! UTF-8 sequences split across reads are reassembled before decoding.
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;

/// Upper bound for a single buffered line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Failure while reading lines from the upstream body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadFault {
    #[error("upstream read failed: {0}")]
    Transport(String),
    #[error("upstream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Splits raw bytes into text lines, keeping the unterminated tail between calls.
pub struct LineSplitter {
    partial: Vec<u8>,
    max_line_bytes: usize,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_bytes,
        }
    }

    /// Feed a chunk and append every completed line to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadFault::LineTooLong`] once the unterminated tail grows past the limit.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut VecDeque<String>) -> Result<(), ReadFault> {
        let mut line_start = 0usize;
        for newline in memchr_iter(b'\n', chunk) {
            let piece = &chunk[line_start..newline];
            if self.partial.is_empty() {
                out.push_back(decode_line(piece));
            } else {
                self.partial.extend_from_slice(piece);
                out.push_back(decode_line(&self.partial));
                self.partial.clear();
            }
            line_start = newline + 1;
        }

        let tail = &chunk[line_start..];
        if self.partial.len() + tail.len() > self.max_line_bytes {
            self.partial.clear();
            return Err(ReadFault::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        self.partial.extend_from_slice(tail);
        Ok(())
    }

    /// Flush the unterminated tail at end of body. Empty tails yield nothing.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = decode_line(&self.partial);
        self.partial.clear();
        Some(line)
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

struct LineStreamState<S> {
    bytes: Pin<Box<S>>,
    splitter: LineSplitter,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a body byte stream into a stream of lines.
///
/// A read error is yielded once as [`ReadFault::Transport`] and ends the stream;
/// the unterminated tail is discarded in that case since the body was truncated.
pub fn line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, ReadFault>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    line_stream_with_limit(byte_stream, DEFAULT_MAX_LINE_BYTES)
}

/// [`line_stream`] with an explicit per-line size limit.
pub fn line_stream_with_limit<S, E>(
    byte_stream: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<String, ReadFault>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        LineStreamState {
            bytes: Box::pin(byte_stream),
            splitter: LineSplitter::with_max_line_bytes(max_line_bytes),
            pending: VecDeque::with_capacity(8),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(line) = state.pending.pop_front() {
                    return Some((Ok(line), state));
                }
                if state.finished {
                    return None;
                }

                match state.bytes.as_mut().next().await {
                    Some(Ok(chunk)) => {
                        if let Err(fault) = state.splitter.feed_into(&chunk, &mut state.pending) {
                            state.finished = true;
                            state.pending.clear();
                            return Some((Err(fault), state));
                        }
                    }
                    Some(Err(err)) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((Err(ReadFault::Transport(err.to_string())), state));
                    }
                    None => {
                        state.finished = true;
                        if let Some(tail) = state.splitter.finish() {
                            state.pending.push_back(tail);
                        }
                    }
                }
            }
        },
    )
}
