pub mod non_streaming;
pub mod sink;
pub mod streaming;

pub use non_streaming::relay_once;
pub use sink::{client_channel, ChannelSink, ClientBodyStream, EventSink, SinkClosed};
pub use streaming::{
    open_upstream_stream, run_stream_relay, RelayReport, StreamOutcome, StreamSettings,
    SupervisorExit,
};

use tokio_util::sync::CancellationToken;

use crate::error::{translate_upstream_failure, RelayError};
use crate::transport::{UpstreamFault, UpstreamResponse};

/// Largest upstream error body the relay reads before giving up on it.
pub const MAX_UPSTREAM_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Drain a non-success upstream response into the error it translates to.
///
/// A body that cannot be read, or runs past [`MAX_UPSTREAM_ERROR_BODY_BYTES`], is
/// treated like an undecodable one, so the client still gets the upstream status line.
pub(crate) async fn upstream_failure(
    response: UpstreamResponse,
    cancel: &CancellationToken,
) -> RelayError {
    let status = response.status();
    let body = match response
        .read_body_capped(cancel, MAX_UPSTREAM_ERROR_BODY_BYTES)
        .await
    {
        Ok((_, true)) => {
            tracing::warn!(
                status = status.as_u16(),
                limit = MAX_UPSTREAM_ERROR_BODY_BYTES,
                "upstream error body exceeds limit, discarding it"
            );
            bytes::Bytes::new()
        }
        Ok((body, false)) => body,
        Err(UpstreamFault::Cancelled) => return RelayError::Cancelled,
        Err(fault) => {
            tracing::warn!(status = status.as_u16(), error = %fault, "failed to read upstream error body");
            bytes::Bytes::new()
        }
    };

    tracing::warn!(
        status = status.as_u16(),
        body_bytes = body.len(),
        "upstream rejected request"
    );
    translate_upstream_failure(status, &body)
}
