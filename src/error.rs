use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Status recorded for requests whose client left before a response was committed.
/// The peer never sees it; it only shows up in access logs.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Relay error taxonomy.
///
/// Everything except [`RelayError::Cancelled`] is translated into exactly one
/// [`ErrorEnvelope`] response, and only while no response bytes have been committed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    ClientInput(String),
    #[error("API key is required")]
    MissingCredential,
    #[error("Request body too large (max {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Upstream rejected request: status={status}, body={body}")]
    UpstreamRejected { status: u16, body: String },
    #[error("Upstream returned undecodable error: {status_line}")]
    UpstreamUndecodable { status_line: String },
    #[error("Upstream response body invalid: {0}")]
    UpstreamBodyInvalid(String),
    #[error("Streaming not supported by client writer")]
    StreamingUnsupported,
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Client disconnected")]
    Cancelled,
}

/// Uniform error body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl RelayError {
    /// HTTP status for the single error response, or `None` when nothing may be written.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        let status = match self {
            RelayError::ClientInput(_) | RelayError::MissingCredential => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::UpstreamRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::UpstreamUndecodable { .. } => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamUnavailable(_)
            | RelayError::UpstreamBodyInvalid(_)
            | RelayError::StreamingUnsupported
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Cancelled => return None,
        };
        Some(status)
    }

    /// Message placed in the envelope. Transport and internal details stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::ClientInput(_) => "Invalid request body".to_string(),
            RelayError::MissingCredential => "API key is required".to_string(),
            RelayError::PayloadTooLarge { .. } => self.to_string(),
            RelayError::UpstreamUnavailable(_) => {
                "Failed to communicate with AI service".to_string()
            }
            RelayError::UpstreamRejected { body, .. } => body.clone(),
            RelayError::UpstreamUndecodable { status_line } => {
                format!("Error from AI service: {status_line}")
            }
            RelayError::UpstreamBodyInvalid(_) => "Failed to parse AI response".to_string(),
            RelayError::StreamingUnsupported => "Streaming not supported".to_string(),
            RelayError::Internal(_) => "Failed to create request".to_string(),
            RelayError::Cancelled => String::new(),
        }
    }

    /// Translate into `(status, envelope)`; `None` for [`RelayError::Cancelled`].
    #[must_use]
    pub fn translate(&self) -> Option<(StatusCode, ErrorEnvelope)> {
        let status = self.status()?;
        Some((status, ErrorEnvelope::new(self.client_message())))
    }
}

/// Build the error for an upstream non-success response.
///
/// A JSON body is forwarded re-serialized under the upstream status; anything else
/// becomes a gateway error carrying the upstream status line.
#[must_use]
pub fn translate_upstream_failure(status: StatusCode, body: &[u8]) -> RelayError {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => RelayError::UpstreamRejected {
            status: status.as_u16(),
            body: value.to_string(),
        },
        Err(_) => RelayError::UpstreamUndecodable {
            status_line: status_line(status),
        },
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Serialize an envelope response with an explicit status.
#[must_use]
pub fn envelope_response(status: StatusCode, envelope: &ErrorEnvelope) -> Response {
    (status, axum::Json(envelope)).into_response()
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self.translate() {
            Some((status, envelope)) => envelope_response(status, &envelope),
            None => {
                // Nobody is listening; keep the status for the access log only.
                let mut response = Response::new(axum::body::Body::empty());
                *response.status_mut() = StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::BAD_REQUEST);
                response
            }
        }
    }
}
