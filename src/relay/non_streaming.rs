use tokio_util::sync::CancellationToken;

use super::upstream_failure;
use crate::error::RelayError;
use crate::protocol::{decode_partial, ApiKey, ChatResponse, CompletionResponse, UpstreamRequest};
use crate::transport::{UpstreamClient, UpstreamFault};

/// Single request/response relay.
///
/// A missing `choices[0].message.content` yields an empty answer; only a body that is
/// not JSON at all is an error.
///
/// # Errors
///
/// Returns the translated transport or upstream failure, [`RelayError::UpstreamBodyInvalid`]
/// for an undecodable success body, or [`RelayError::Cancelled`] once the client left.
pub async fn relay_once(
    client: &UpstreamClient,
    cancel: &CancellationToken,
    request: &UpstreamRequest,
    credential: &ApiKey,
) -> Result<ChatResponse, RelayError> {
    let response = client.send(cancel, request, credential).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(upstream_failure(response, cancel).await);
    }

    let body = response.read_body(cancel).await.map_err(|fault| match fault {
        UpstreamFault::Cancelled => RelayError::Cancelled,
        other => RelayError::UpstreamUnavailable(format!("Failed to read response: {other}")),
    })?;

    let completion: CompletionResponse = decode_partial(&body)
        .map_err(|err| RelayError::UpstreamBodyInvalid(err.to_string()))?;

    let ai_response = completion.into_content();
    tracing::debug!(
        status = status.as_u16(),
        bytes = body.len(),
        answer_bytes = ai_response.len(),
        "upstream completion received"
    );
    Ok(ChatResponse { ai_response })
}
