//! Outbound completion request and the partial response schemas the relay reads back.
//!
//! Response types only name the fields the relay needs. Every field is decoded
//! leniently: a missing, `null` or mistyped value is "absent", and unknown fields are
//! ignored, so upstream schema additions never break decoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::chat::ChatRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: UpstreamRole,
    pub content: String,
}

/// Completion request sent upstream. Sampling fields left at zero are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl UpstreamRequest {
    /// Build the upstream request: system instruction first, then the user message.
    #[must_use]
    pub fn from_chat(request: &ChatRequest, default_model: &str) -> Self {
        let model = if request.model_name.trim().is_empty() {
            default_model.to_string()
        } else {
            request.model_name.clone()
        };
        Self {
            model,
            messages: vec![
                UpstreamMessage {
                    role: UpstreamRole::System,
                    content: request.user_instruction.clone(),
                },
                UpstreamMessage {
                    role: UpstreamRole::User,
                    content: request.user_message.clone(),
                },
            ],
            stream: request.stream,
            temperature: non_zero_f64(request.temperature),
            top_p: non_zero_f64(request.top_p),
            max_tokens: (request.max_tokens != 0).then_some(request.max_tokens),
        }
    }
}

#[inline]
fn non_zero_f64(value: f64) -> Option<f64> {
    (value != 0.0).then_some(value)
}

// ---------------------------------------------------------------------------
// Partial response schemas
// ---------------------------------------------------------------------------

/// One streaming line: `{"choices":[{"delta":{"content":"..."}}]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChunk {
    #[serde(default, rename = "choices", deserialize_with = "first_element")]
    pub first_choice: Option<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default, deserialize_with = "lenient")]
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// `choices[0].delta.content`, or `None` for content-free control chunks.
    #[must_use]
    pub fn into_content(self) -> Option<String> {
        self.first_choice?.delta?.content
    }
}

/// Full non-streaming body: `{"choices":[{"message":{"content":"..."}}]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default, rename = "choices", deserialize_with = "first_element")]
    pub first_choice: Option<MessageChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageChoice {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<CompletionMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
}

impl CompletionResponse {
    /// `choices[0].message.content`, empty when any step of the path is absent.
    #[must_use]
    pub fn into_content(self) -> String {
        self.first_choice
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default()
    }
}

/// Decode a JSON document against a partial schema.
///
/// Only syntax errors fail; a well-formed document of the wrong shape decodes to
/// `T::default()`.
///
/// # Errors
///
/// Returns the `serde_json` error when `input` is not valid JSON.
pub fn decode_partial<T>(input: &[u8]) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    let value: serde_json::Value = serde_json::from_slice(input)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| T::deserialize(value).ok()))
}

fn first_element<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .next()
            .and_then(|first| T::deserialize(first).ok()),
        _ => None,
    })
}
