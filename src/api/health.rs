use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chat-relay is running",
        "config": {
            "chat_route": format!("{}/chat", state.base_path()),
            "upstream": {
                "completions_url": state.upstream.completions_url(),
                "default_model": config.upstream.default_model,
                "timeout_secs": config.upstream.timeout_secs,
            },
            "cors_origins_count": config.cors.allowed_origins.len(),
            "features": {
                "log_level": config.features.log_level,
                "progress_log_interval": config.features.progress_log_interval,
            }
        }
    }))
}
