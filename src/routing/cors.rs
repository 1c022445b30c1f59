use http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// Origin entry that stands for every origin.
pub const WILDCARD_ORIGIN: &str = "*";

/// Build the CORS layer.
///
/// Explicit origins allow credentials; an empty list or a `"*"` entry allows any
/// origin without them.
#[must_use]
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let wildcard = config
        .allowed_origins
        .iter()
        .any(|origin| origin.trim() == WILDCARD_ORIGIN);
    if config.allowed_origins.is_empty() || wildcard {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    cors.allow_origin(origins).allow_credentials(true)
}
