//! Server-sent event encoding for the client-facing stream.
//!
//! Every event is one block: `event: <name>\ndata: <json>\n\n`.
use bytes::Bytes;

use super::StreamEvent;
use crate::util::{push_json_string_escaped, push_u64_decimal};

const EMPTY_OBJECT: &str = "{}";

/// Encode a named SSE block around an already-serialized JSON payload.
#[must_use]
pub fn named_sse_frame(event: &str, json: &str) -> String {
    let mut out = String::with_capacity(18 + event.len() + json.len());
    out.push_str("event: ");
    out.push_str(event);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Serialize the JSON payload carried by an event.
#[must_use]
pub fn event_payload(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Start | StreamEvent::End => EMPTY_OBJECT.to_owned(),
        StreamEvent::Chunk { content } => {
            let mut out = String::with_capacity(14 + content.len());
            out.push_str("{\"content\":");
            push_json_string_escaped(&mut out, content);
            out.push('}');
            out
        }
        StreamEvent::Error { status_code, body } => {
            let mut out = String::with_capacity(32 + body.len());
            out.push_str("{\"statusCode\":");
            push_u64_decimal(&mut out, u64::from(*status_code));
            out.push_str(",\"body\":");
            push_json_string_escaped(&mut out, body);
            out.push('}');
            out
        }
    }
}

/// Encode an event into its wire block.
#[must_use]
pub fn encode_event(event: &StreamEvent) -> String {
    named_sse_frame(event.name(), &event_payload(event))
}

/// Encode an event into a body frame ready to hand to the client writer.
#[must_use]
pub fn encode_event_bytes(event: &StreamEvent) -> Bytes {
    Bytes::from(encode_event(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_end_frames() {
        assert_eq!(encode_event(&StreamEvent::Start), "event: start\ndata: {}\n\n");
        assert_eq!(encode_event(&StreamEvent::End), "event: end\ndata: {}\n\n");
    }

    #[test]
    fn test_chunk_frame() {
        let event = StreamEvent::Chunk {
            content: "Hi".to_string(),
        };
        assert_eq!(
            encode_event(&event),
            "event: chunk\ndata: {\"content\":\"Hi\"}\n\n"
        );
    }

    #[test]
    fn test_chunk_newlines_stay_inside_one_data_line() {
        let event = StreamEvent::Chunk {
            content: "line1\nline2 \"quoted\"".to_string(),
        };
        let frame = encode_event(&event);
        assert_eq!(frame.matches('\n').count(), 3);
        let data = frame
            .strip_prefix("event: chunk\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(payload["content"], "line1\nline2 \"quoted\"");
    }

    #[test]
    fn test_error_frame() {
        let event = StreamEvent::Error {
            status_code: 502,
            body: "{\"error\":\"x\"}".to_string(),
        };
        let frame = encode_event(&event);
        assert!(frame.starts_with("event: error\ndata: "));
        let data = frame
            .strip_prefix("event: error\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(payload["statusCode"], 502);
        assert_eq!(payload["body"], "{\"error\":\"x\"}");
    }
}
