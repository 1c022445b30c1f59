use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use http::{HeaderMap, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::protocol::{ApiKey, UpstreamRequest};

/// Failure of one upstream exchange.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamFault {
    /// The caller's context was cancelled before or during the exchange.
    #[error("upstream call cancelled")]
    Cancelled,
    #[error("failed to build upstream request: {0}")]
    Build(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl From<UpstreamFault> for RelayError {
    fn from(fault: UpstreamFault) -> Self {
        match fault {
            UpstreamFault::Cancelled => RelayError::Cancelled,
            UpstreamFault::Build(message) => RelayError::Internal(message),
            UpstreamFault::Timeout(message) | UpstreamFault::Transport(message) => {
                RelayError::UpstreamUnavailable(message)
            }
        }
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> UpstreamFault {
    if err.is_timeout() {
        UpstreamFault::Timeout(err.to_string())
    } else if err.is_builder() {
        UpstreamFault::Build(err.to_string())
    } else {
        UpstreamFault::Transport(err.to_string())
    }
}

fn build_reqwest_client(config: &UpstreamConfig) -> Result<reqwest::Client, UpstreamFault> {
    let pool_idle_timeout = if config.pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout_secs));

    if !config.use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| UpstreamFault::Build(format!("Failed to build HTTP client: {err}")))
}

/// Client for the upstream completions endpoint.
///
/// The overall timeout covers connect, headers and body, and is independent of the
/// per-request cancellation token: whichever fires first ends the exchange.
pub struct UpstreamClient {
    client: reqwest::Client,
    completions_url: reqwest::Url,
}

impl UpstreamClient {
    /// Build a pooled client from upstream settings.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFault::Build`] when the endpoint URL is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamFault> {
        let url = config.completions_url();
        let completions_url = reqwest::Url::parse(&url)
            .map_err(|err| UpstreamFault::Build(format!("Invalid upstream URL '{url}': {err}")))?;
        Ok(Self {
            client: build_reqwest_client(config)?,
            completions_url,
        })
    }

    #[must_use]
    pub fn completions_url(&self) -> &str {
        self.completions_url.as_str()
    }

    /// Send a completion request.
    ///
    /// The returned body is still open; dropping the [`UpstreamResponse`] releases the
    /// connection on every path.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFault::Cancelled`] when `cancel` already fired or fires while
    /// waiting for response headers, and a build/timeout/transport fault otherwise.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        request: &UpstreamRequest,
        credential: &ApiKey,
    ) -> Result<UpstreamResponse, UpstreamFault> {
        if cancel.is_cancelled() {
            return Err(UpstreamFault::Cancelled);
        }

        let body = serde_json::to_vec(request)
            .map_err(|err| UpstreamFault::Build(format!("Failed to encode request: {err}")))?;

        tracing::debug!(
            url = %self.completions_url,
            model = %request.model,
            stream = request.stream,
            "sending upstream request"
        );

        let pending = self
            .client
            .post(self.completions_url.clone())
            .header(http::header::CONTENT_TYPE, "application/json")
            .bearer_auth(credential.expose())
            .body(body)
            .send();

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpstreamFault::Cancelled),
            result = pending => match result {
                Ok(response) => Ok(UpstreamResponse::new(response)),
                Err(err) if cancel.is_cancelled() => {
                    tracing::debug!(error = %err, "upstream send failed after cancellation");
                    Err(UpstreamFault::Cancelled)
                }
                Err(err) => Err(classify_reqwest_error(&err)),
            },
        }
    }
}

/// Open upstream response. Owns the connection until dropped.
pub struct UpstreamResponse {
    inner: reqwest::Response,
}

impl UpstreamResponse {
    fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Read the whole body, giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFault::Cancelled`] on cancellation, otherwise the classified
    /// read failure.
    pub async fn read_body(self, cancel: &CancellationToken) -> Result<Bytes, UpstreamFault> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpstreamFault::Cancelled),
            result = self.inner.bytes() => result.map_err(|err| classify_reqwest_error(&err)),
        }
    }

    /// Read at most `limit` bytes of the body, giving up when `cancel` fires.
    ///
    /// The flag is `true` when the body was longer than `limit` and got cut off; the
    /// rest is left unread and released with the connection.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFault::Cancelled`] on cancellation, otherwise the classified
    /// read failure.
    pub async fn read_body_capped(
        mut self,
        cancel: &CancellationToken,
        limit: usize,
    ) -> Result<(Bytes, bool), UpstreamFault> {
        let mut buffer = BytesMut::new();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(UpstreamFault::Cancelled),
                result = self.inner.chunk() => result.map_err(|err| classify_reqwest_error(&err))?,
            };
            let Some(chunk) = next else {
                return Ok((buffer.freeze(), false));
            };
            let room = limit - buffer.len();
            if chunk.len() > room {
                buffer.extend_from_slice(&chunk[..room]);
                return Ok((buffer.freeze(), true));
            }
            buffer.extend_from_slice(&chunk);
        }
    }

    /// Hand the body over as a byte stream.
    pub fn into_byte_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send {
        self.inner.bytes_stream()
    }
}
