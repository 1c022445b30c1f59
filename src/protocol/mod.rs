pub mod chat;
pub mod upstream;

pub use chat::{ApiKey, ChatRequest, ChatRequestWire, ChatResponse};
pub use upstream::{
    decode_partial, CompletionChunk, CompletionResponse, UpstreamMessage, UpstreamRequest,
    UpstreamRole,
};
