use crate::protocol::upstream::{decode_partial, CompletionChunk};

/// Prefix carried by every upstream data line.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that marks the end of the upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Classification of one raw upstream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamLine<'a> {
    Blank,
    /// Comment, heartbeat or any other line without the data prefix.
    Ignored,
    Done,
    Data(&'a str),
}

/// Classify a raw line without decoding its payload.
#[must_use]
pub fn classify_line(line: &str) -> UpstreamLine<'_> {
    if line.is_empty() {
        return UpstreamLine::Blank;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(DONE_SENTINEL) => UpstreamLine::Done,
        Some(payload) => UpstreamLine::Data(payload),
        None => UpstreamLine::Ignored,
    }
}

/// A data payload that is not valid JSON.
#[derive(Debug, thiserror::Error)]
#[error("malformed upstream chunk: {0}")]
pub struct ParseFault(#[from] serde_json::Error);

/// Extract `choices[0].delta.content` from a data payload.
///
/// Returns `Ok(None)` for well-formed chunks that carry no text (role
/// announcements, finish markers, empty deltas, unexpected shapes).
///
/// # Errors
///
/// Returns [`ParseFault`] only when the payload is not syntactically valid JSON.
pub fn parse_chunk(payload: &str) -> Result<Option<String>, ParseFault> {
    let chunk: CompletionChunk = decode_partial(payload.as_bytes())?;
    Ok(chunk.into_content().filter(|content| !content.is_empty()))
}
