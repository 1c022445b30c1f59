pub mod chunk;
pub mod lines;
pub mod sse;

pub use chunk::{classify_line, parse_chunk, ParseFault, UpstreamLine, DATA_PREFIX, DONE_SENTINEL};
pub use lines::{line_stream, line_stream_with_limit, LineSplitter, ReadFault};
pub use sse::{encode_event, encode_event_bytes};

/// Event vocabulary of the client-facing stream.
///
/// A well-formed stream is one `Start`, any number of `Chunk`s and at most one `End`.
/// A stream that stops without `End` was cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Start,
    Chunk { content: String },
    End,
    Error { status_code: u16, body: String },
}

impl StreamEvent {
    /// Wire event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Start => "start",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::End => "end",
            StreamEvent::Error { .. } => "error",
        }
    }
}
