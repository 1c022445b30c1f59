use tracing_subscriber::EnvFilter;

use crate::relay::{RelayReport, StreamOutcome};

/// Map a configured log level onto a tracing filter directive.
///
/// `None` means logging is disabled.
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log the end-of-call summary of a streaming relay.
pub fn log_stream_report(report: &RelayReport) {
    let elapsed_ms = report.elapsed.as_millis() as u64;
    match &report.outcome {
        StreamOutcome::Completed => tracing::info!(
            outcome = report.outcome.as_str(),
            lines = report.lines,
            chunks = report.chunks,
            malformed = report.malformed,
            transcript_bytes = report.transcript_bytes,
            elapsed_ms,
            "stream relay finished"
        ),
        StreamOutcome::ReadFailed(error) => tracing::warn!(
            outcome = report.outcome.as_str(),
            error = %error,
            lines = report.lines,
            chunks = report.chunks,
            transcript_bytes = report.transcript_bytes,
            elapsed_ms,
            "stream relay cut short"
        ),
        StreamOutcome::UpstreamClosed | StreamOutcome::ClientGone => tracing::warn!(
            outcome = report.outcome.as_str(),
            lines = report.lines,
            chunks = report.chunks,
            transcript_bytes = report.transcript_bytes,
            elapsed_ms,
            "stream relay ended without end event"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::filter_directive;

    #[test]
    fn test_level_mapping() {
        assert_eq!(filter_directive("warning").as_deref(), Some("WARN"));
        assert_eq!(filter_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(filter_directive("debug").as_deref(), Some("DEBUG"));
        assert_eq!(filter_directive("DISABLED"), None);
    }
}
