//! `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter directive for a run: `RUST_LOG` wins, then `LOG_LEVEL`, then the
/// CLI verbosity (0 = info, 1 = debug, 2+ = trace).
pub fn filter_directive(
    rust_log: Option<&str>,
    log_level: Option<&str>,
    verbosity: u8,
) -> String {
    if let Some(directive) = rust_log.filter(|s| !s.trim().is_empty()) {
        return directive.to_string();
    }
    if verbosity == 0 {
        if let Some(level) = log_level.filter(|s| !s.trim().is_empty()) {
            return level.trim().to_ascii_lowercase();
        }
    }
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
    .to_string()
}

/// Install the global subscriber, writing to stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbosity: u8) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    let directive = filter_directive(rust_log.as_deref(), log_level.as_deref(), verbosity);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        assert_eq!(
            filter_directive(Some("dora_metrics=trace"), Some("warn"), 2),
            "dora_metrics=trace"
        );
    }

    #[test]
    fn test_log_level_used_without_verbosity() {
        assert_eq!(filter_directive(None, Some("WARN"), 0), "warn");
        assert_eq!(filter_directive(None, Some("WARN"), 1), "debug");
    }

    #[test]
    fn test_default_is_info() {
        assert_eq!(filter_directive(None, None, 0), "info");
        assert_eq!(filter_directive(Some(""), None, 3), "trace");
    }
}
