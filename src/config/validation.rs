use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED"];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_config(config)?;
    validate_cors_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.host.trim().is_empty() {
        return Err(validation_err("server.host cannot be empty"));
    }
    if server.body_limit_bytes == 0 {
        return Err(validation_err(
            "server.body_limit_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream_config(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(upstream.base_url.trim()).map_err(|err| {
        validation_err(format!(
            "upstream.base_url '{}' is not a valid URL: {err}",
            upstream.base_url
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "upstream.base_url must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    if upstream.default_model.trim().is_empty() {
        return Err(validation_err("upstream.default_model cannot be empty"));
    }
    if upstream.timeout_secs == 0 {
        return Err(validation_err(
            "upstream.timeout_secs must be greater than 0",
        ));
    }
    if upstream.connect_timeout_secs == 0 {
        return Err(validation_err(
            "upstream.connect_timeout_secs must be greater than 0",
        ));
    }
    if upstream.pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "upstream.pool_max_idle_per_host must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_cors_config(config: &AppConfig) -> Result<(), ConfigError> {
    for origin in &config.cors.allowed_origins {
        if origin.parse::<http::HeaderValue>().is_err() || origin.trim().is_empty() {
            return Err(validation_err(format!(
                "cors.allowed_origins contains an invalid origin '{origin}'"
            )));
        }
    }
    let origins = &config.cors.allowed_origins;
    if origins.len() > 1 && origins.iter().any(|origin| origin.trim() == "*") {
        return Err(validation_err(
            "cors.allowed_origins: '*' cannot be combined with explicit origins",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' must be one of {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
