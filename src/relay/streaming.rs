//! Streaming relay: upstream `data:` lines in, `start`/`chunk`/`end` events out.
//!
//! The pump runs as its own task and owns the upstream body, the client sink and the
//! transcript. The supervisor only waits for the first of two signals: the pump's
//! one-shot completion report or the request's cancellation token. The pump checks the
//! same token before every line, so after a disconnect it stops within one iteration
//! and drops the upstream body, which closes the outbound connection.
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::sink::EventSink;
use super::upstream_failure;
use crate::error::RelayError;
use crate::observability::log_stream_report;
use crate::protocol::{ApiKey, UpstreamRequest};
use crate::stream::lines::{line_stream_with_limit, DEFAULT_MAX_LINE_BYTES};
use crate::stream::{classify_line, encode_event_bytes, parse_chunk, StreamEvent, UpstreamLine};
use crate::transport::{UpstreamClient, UpstreamResponse};

/// Knobs for one streaming relay.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Log a progress line every this many upstream lines; `0` disables it.
    pub progress_log_interval: u64,
    pub max_line_bytes: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            progress_log_interval: 10,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// How the pump loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream sent `[DONE]` and `end` was delivered.
    Completed,
    /// Upstream closed the body without the sentinel.
    UpstreamClosed,
    ReadFailed(String),
    ClientGone,
}

impl StreamOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::UpstreamClosed => "upstream_closed",
            StreamOutcome::ReadFailed(_) => "read_failed",
            StreamOutcome::ClientGone => "client_gone",
        }
    }
}

/// End-of-call diagnostics. The transcript text itself never leaves the pump.
#[derive(Debug, Clone)]
pub struct RelayReport {
    pub outcome: StreamOutcome,
    pub lines: u64,
    pub chunks: u64,
    pub malformed: u64,
    pub transcript_bytes: usize,
    pub elapsed: Duration,
}

/// What the supervisor observed first.
#[derive(Debug)]
pub enum SupervisorExit {
    Finished(RelayReport),
    Cancelled,
    /// The pump task ended without reporting (it panicked).
    PumpLost,
}

/// Steps before the commit point: writer check, upstream send, status check.
///
/// On success the caller owns an upstream body that is known to be a 2xx stream.
///
/// # Errors
///
/// [`RelayError::StreamingUnsupported`] without contacting upstream when the sink cannot
/// flush, [`RelayError::Cancelled`] when the client left, and otherwise the translated
/// transport or upstream failure.
pub async fn open_upstream_stream<K: EventSink>(
    sink: &K,
    client: &UpstreamClient,
    cancel: &CancellationToken,
    request: &UpstreamRequest,
    credential: &ApiKey,
) -> Result<UpstreamResponse, RelayError> {
    if !sink.supports_flush() {
        return Err(RelayError::StreamingUnsupported);
    }

    let response = client.send(cancel, request, credential).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(upstream_failure(response, cancel).await);
    }

    tracing::debug!(status = status.as_u16(), "upstream stream opened");
    Ok(response)
}

/// Run the relay after the commit point.
///
/// Emits `start`, spawns the pump and waits for the pump's report or cancellation,
/// whichever comes first. The pump logs its own summary, so the report is recorded
/// even when the supervisor has already returned.
pub async fn run_stream_relay<S, E, K>(
    upstream_body: S,
    mut sink: K,
    cancel: CancellationToken,
    settings: StreamSettings,
) -> SupervisorExit
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
    K: EventSink + 'static,
{
    let started = Instant::now();

    if sink.send(encode_event_bytes(&StreamEvent::Start)).await.is_err() {
        let report = RelayReport {
            outcome: StreamOutcome::ClientGone,
            lines: 0,
            chunks: 0,
            malformed: 0,
            transcript_bytes: 0,
            elapsed: started.elapsed(),
        };
        log_stream_report(&report);
        return SupervisorExit::Finished(report);
    }

    let (done_tx, done_rx) = oneshot::channel();
    let pump_cancel = cancel.clone();
    tokio::spawn(
        async move {
            let report = pump(upstream_body, &mut sink, &pump_cancel, settings, started).await;
            log_stream_report(&report);
            let _ = done_tx.send(report);
        }
        .instrument(tracing::Span::current()),
    );

    tokio::select! {
        biased;
        report = done_rx => match report {
            Ok(report) => SupervisorExit::Finished(report),
            Err(_) => SupervisorExit::PumpLost,
        },
        () = cancel.cancelled() => SupervisorExit::Cancelled,
    }
}

async fn pump<S, E, K>(
    upstream_body: S,
    sink: &mut K,
    cancel: &CancellationToken,
    settings: StreamSettings,
    started: Instant,
) -> RelayReport
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
    K: EventSink,
{
    let lines = line_stream_with_limit(upstream_body, settings.max_line_bytes);
    tokio::pin!(lines);

    let mut transcript = String::new();
    let mut line_count = 0u64;
    let mut chunk_count = 0u64;
    let mut malformed = 0u64;

    let outcome = loop {
        if cancel.is_cancelled() {
            break StreamOutcome::ClientGone;
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break StreamOutcome::ClientGone,
            next = lines.next() => next,
        };

        let line = match next {
            None => break StreamOutcome::UpstreamClosed,
            Some(Err(fault)) => break StreamOutcome::ReadFailed(fault.to_string()),
            Some(Ok(line)) => line,
        };

        line_count += 1;
        if settings.progress_log_interval > 0 && line_count % settings.progress_log_interval == 0 {
            tracing::debug!(
                line = line_count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "relay progress"
            );
        }

        let payload = match classify_line(&line) {
            UpstreamLine::Blank | UpstreamLine::Ignored => continue,
            UpstreamLine::Done => {
                if sink.send(encode_event_bytes(&StreamEvent::End)).await.is_err() {
                    break StreamOutcome::ClientGone;
                }
                break StreamOutcome::Completed;
            }
            UpstreamLine::Data(payload) => payload,
        };

        let content = match parse_chunk(payload) {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(err) => {
                malformed += 1;
                tracing::warn!(line = line_count, error = %err, "skipping malformed upstream chunk");
                continue;
            }
        };

        transcript.push_str(&content);
        chunk_count += 1;
        if sink
            .send(encode_event_bytes(&StreamEvent::Chunk { content }))
            .await
            .is_err()
        {
            break StreamOutcome::ClientGone;
        }
    };

    RelayReport {
        outcome,
        lines: line_count,
        chunks: chunk_count,
        malformed,
        transcript_bytes: transcript.len(),
        elapsed: started.elapsed(),
    }
}
