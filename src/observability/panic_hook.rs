//! Custom panic hook for structured crash reports.
//!
//! A crash report names the version, the run phase and record being
//! processed, and how far through the phase the run got.

use super::context::{get_current_context, get_progress, RunContext};
use std::panic::PanicHookInfo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the crash-report panic hook. Call once at the top of `main`.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let report = crash_report(
            &extract_panic_message(info),
            info.location().map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
            &get_current_context(),
            get_progress(),
        );
        eprintln!("{report}");
        if std::env::var("RUST_BACKTRACE").is_ok() {
            eprintln!("{}", std::backtrace::Backtrace::capture());
        } else {
            eprintln!("Run with RUST_BACKTRACE=1 for a stack trace");
        }
    }));
}

fn crash_report(
    message: &str,
    location: Option<String>,
    context: &RunContext,
    (processed, total): (usize, usize),
) -> String {
    let mut lines = vec![
        "==== DORA-METRICS CRASH REPORT ====".to_string(),
        format!("Version: {VERSION}"),
        format!("Platform: {}", std::env::consts::OS),
        format!("Time: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Panic: {}", truncate(message, 200)),
    ];
    if let Some(location) = location {
        lines.push(format!("Location: {location}"));
    }
    match context.phase {
        Some(phase) => lines.push(format!("Phase: {phase}")),
        None => lines.push("Phase: (not set, crash occurred before the run started)".to_string()),
    }
    if let Some(record) = &context.current_record {
        lines.push(format!("Record: {record}"));
    }
    if total > 0 {
        lines.push(format!("Progress: {processed} / {total}"));
    }
    lines.join("\n")
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::RunPhase;

    #[test]
    fn test_truncate_long_string() {
        let result = truncate("this is a long string that needs truncation", 20);
        assert_eq!(result.chars().count(), 20);
        assert!(result.ends_with("..."));
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_report_names_phase_and_record() {
        let context = RunContext {
            phase: Some(RunPhase::LeadTimeMapping),
            current_record: Some("window 3".into()),
        };
        let report = crash_report("boom", Some("src/x.rs:1:2".into()), &context, (3, 9));
        assert!(report.contains("Phase: lead_time_mapping"));
        assert!(report.contains("Record: window 3"));
        assert!(report.contains("Progress: 3 / 9"));
        assert!(report.contains("Location: src/x.rs:1:2"));
    }

    #[test]
    fn test_report_without_phase() {
        let report = crash_report("boom", None, &RunContext::default(), (0, 0));
        assert!(report.contains("before the run started"));
        assert!(!report.contains("Progress"));
    }
}
