use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

use crate::error::RelayError;
use crate::protocol::{ApiKey, ChatRequest, UpstreamRequest};
use crate::relay::{
    client_channel, open_upstream_stream, relay_once, run_stream_relay, SupervisorExit,
};
use crate::state::AppState;

/// `POST {base}/chat`.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = state.next_request_id();
    let span = tracing::info_span!("chat", %request_id);
    match handler_inner(state, body).instrument(span).await {
        Ok(response) => response,
        Err(err) => {
            if let RelayError::Cancelled = err {
                tracing::info!(%request_id, "client left before a response was committed");
            } else {
                tracing::warn!(%request_id, error = %err, "chat request failed");
            }
            err.into_response()
        }
    }
}

async fn handler_inner(state: Arc<AppState>, body: Bytes) -> Result<Response, RelayError> {
    let chat = ChatRequest::from_json_bytes(&body)?;
    let upstream_request = UpstreamRequest::from_chat(&chat, &state.config.upstream.default_model);
    tracing::info!(
        model = %upstream_request.model,
        stream = chat.stream,
        message_bytes = chat.user_message.len(),
        "relaying chat request"
    );

    // Fires when the handler future or the streaming body is dropped.
    let cancel = CancellationToken::new();
    let disconnect = cancel.clone().drop_guard();

    if chat.stream {
        return stream_response(
            state,
            cancel,
            disconnect,
            &upstream_request,
            &chat.model_api_key,
        )
        .await;
    }

    let _disconnect = disconnect;
    let answer = relay_once(
        &state.upstream,
        &cancel,
        &upstream_request,
        &chat.model_api_key,
    )
    .await?;
    Ok(Json(answer).into_response())
}

async fn stream_response(
    state: Arc<AppState>,
    cancel: CancellationToken,
    disconnect: DropGuard,
    request: &UpstreamRequest,
    credential: &ApiKey,
) -> Result<Response, RelayError> {
    let (sink, client_body) = client_channel(disconnect);
    let upstream = open_upstream_stream(&sink, &state.upstream, &cancel, request, credential).await?;

    let settings = state.stream_settings();
    tokio::spawn(
        async move {
            match run_stream_relay(upstream.into_byte_stream(), sink, cancel, settings).await {
                SupervisorExit::Finished(_) => {}
                SupervisorExit::Cancelled => {
                    tracing::info!("client disconnected, stream relay stopping");
                }
                SupervisorExit::PumpLost => {
                    tracing::error!("stream pump ended without reporting");
                }
            }
        }
        .instrument(tracing::Span::current()),
    );

    Ok(sse_ok_response(Body::from_stream(client_body)))
}

fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        http::HeaderName::from_static("x-accel-buffering"),
        http::HeaderValue::from_static("no"),
    );
    response
}
