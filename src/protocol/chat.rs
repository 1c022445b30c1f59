//! Inbound wire types for the `/chat` route.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Chat request body as sent by browser clients.
///
/// Every field is optional on the wire; absent and `null` both mean "unset".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestWire {
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub user_instruction: Option<String>,
    #[serde(default)]
    pub model_api: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Bearer credential forwarded to the upstream. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Validated chat request. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_message: String,
    pub user_instruction: String,
    pub model_api_key: ApiKey,
    pub model_name: String,
    pub stream: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Decode and validate a raw request body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ClientInput`] for malformed JSON and
    /// [`RelayError::MissingCredential`] when `modelApi` is absent or empty.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, RelayError> {
        let wire: ChatRequestWire = serde_json::from_slice(body)
            .map_err(|err| RelayError::ClientInput(err.to_string()))?;
        Self::try_from(wire)
    }
}

impl TryFrom<ChatRequestWire> for ChatRequest {
    type Error = RelayError;

    fn try_from(wire: ChatRequestWire) -> Result<Self, Self::Error> {
        let key = wire.model_api.unwrap_or_default();
        if key.trim().is_empty() {
            return Err(RelayError::MissingCredential);
        }
        Ok(Self {
            user_message: wire.user_message.unwrap_or_default(),
            user_instruction: wire.user_instruction.unwrap_or_default(),
            model_api_key: ApiKey(key),
            model_name: wire.model_name.unwrap_or_default(),
            stream: wire.stream.unwrap_or(false),
            temperature: wire.temperature.unwrap_or(0.0),
            top_p: wire.top_p.unwrap_or(0.0),
            max_tokens: wire.max_tokens.unwrap_or(0),
        })
    }
}

/// Non-streaming success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(rename = "aiResponse")]
    pub ai_response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_request() {
        let req = ChatRequest::from_json_bytes(
            br#"{"userMessage":"hi","userInstruction":"be terse","modelApi":"key",
                "modelName":"deepseek-reasoner","stream":true,"temperature":0.7,
                "topP":0.9,"maxTokens":256}"#,
        )
        .unwrap();
        assert_eq!(req.user_message, "hi");
        assert_eq!(req.user_instruction, "be terse");
        assert_eq!(req.model_api_key.expose(), "key");
        assert_eq!(req.model_name, "deepseek-reasoner");
        assert!(req.stream);
        assert!((req.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(req.max_tokens, 256);
    }

    #[test]
    fn test_nulls_and_missing_fields_default() {
        let req =
            ChatRequest::from_json_bytes(br#"{"modelApi":"key","temperature":null}"#).unwrap();
        assert_eq!(req.user_message, "");
        assert!(!req.stream);
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, 0);
    }

    #[test]
    fn test_missing_credential() {
        let err = ChatRequest::from_json_bytes(br#"{"userMessage":"hi"}"#).unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential));
        let err = ChatRequest::from_json_bytes(br#"{"modelApi":""}"#).unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential));
    }

    #[test]
    fn test_malformed_body() {
        let err = ChatRequest::from_json_bytes(b"{\"userMessage\":").unwrap_err();
        assert!(matches!(err, RelayError::ClientInput(_)));
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let req = ChatRequest::from_json_bytes(br#"{"modelApi":"sk-secret"}"#).unwrap();
        assert!(!format!("{req:?}").contains("sk-secret"));
    }

    #[test]
    fn test_response_field_name() {
        let json = serde_json::to_string(&ChatResponse {
            ai_response: "Hi!".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"aiResponse":"Hi!"}"#);
    }
}
