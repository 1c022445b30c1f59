mod request_id;

use crate::config::AppConfig;
use crate::relay::StreamSettings;
use crate::routing::normalize_base_path;
use crate::stream::lines::DEFAULT_MAX_LINE_BYTES;
use crate::transport::{UpstreamClient, UpstreamFault};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamClient,
    base_path: String,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, upstream: UpstreamClient) -> Self {
        let base_path = normalize_base_path(&config.server.base_path);
        Self {
            config,
            upstream,
            base_path,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build state together with its upstream client.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFault::Build`] when the upstream client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, UpstreamFault> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self::new(config, upstream))
    }

    /// Normalized route prefix; empty when routes are mounted at the root.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[must_use]
    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_id()
    }

    #[must_use]
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            progress_log_interval: self.config.features.progress_log_interval,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}
