//! Thread-local context tracking for crash reports.
//!
//! Records which stage of a run is executing and which record it is working
//! on. Guards restore the previous context on drop so phases can nest.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

static RECORDS_PROCESSED: AtomicUsize = AtomicUsize::new(0);
static RECORDS_TOTAL: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CONTEXT: RefCell<RunContext> = const { RefCell::new(RunContext::new()) };
}

/// Snapshot of what the run was doing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub phase: Option<RunPhase>,
    /// Record being processed, e.g. `deployment 42` or `change 17`
    pub current_record: Option<String>,
}

impl RunContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: None,
            current_record: None,
        }
    }
}

/// Major steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Configuration,
    Ingestion,
    WindowBuilding,
    LeadTimeMapping,
    FailureClassification,
    DailyRollup,
    EventStream,
    Export,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Ingestion => "ingestion",
            Self::WindowBuilding => "window_building",
            Self::LeadTimeMapping => "lead_time_mapping",
            Self::FailureClassification => "failure_classification",
            Self::DailyRollup => "daily_rollup",
            Self::EventStream => "event_stream",
            Self::Export => "export",
        };
        f.write_str(name)
    }
}

/// RAII guard restoring the previous context on drop.
pub struct ContextGuard {
    previous: RunContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = self.previous.clone();
        });
    }
}

/// Set the current run phase until the guard drops.
#[must_use]
pub fn set_phase(phase: RunPhase) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        ctx.borrow_mut().phase = Some(phase);
        ContextGuard { previous }
    })
}

/// Set the record being processed until the guard drops.
#[must_use]
pub fn set_current_record(record: impl Into<String>) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        ctx.borrow_mut().current_record = Some(record.into());
        ContextGuard { previous }
    })
}

pub fn set_progress(processed: usize, total: usize) {
    RECORDS_PROCESSED.store(processed, Ordering::Relaxed);
    RECORDS_TOTAL.store(total, Ordering::Relaxed);
}

pub fn increment_processed() {
    RECORDS_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

#[must_use]
pub fn get_current_context() -> RunContext {
    CURRENT_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Progress as (processed, total).
#[must_use]
pub fn get_progress() -> (usize, usize) {
    (
        RECORDS_PROCESSED.load(Ordering::Relaxed),
        RECORDS_TOTAL.load(Ordering::Relaxed),
    )
}

/// Reset the current thread's context to empty.
pub fn reset_context() {
    CURRENT_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = RunContext::new();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_guard_restores_previous() {
        reset_context();

        let _outer = set_phase(RunPhase::Ingestion);
        {
            let _inner = set_phase(RunPhase::FailureClassification);
            let _record = set_current_record("deployment 7");
            let ctx = get_current_context();
            assert_eq!(ctx.phase, Some(RunPhase::FailureClassification));
            assert_eq!(ctx.current_record.as_deref(), Some("deployment 7"));
        }

        let ctx = get_current_context();
        assert_eq!(ctx.phase, Some(RunPhase::Ingestion));
        assert!(ctx.current_record.is_none());
    }

    #[test]
    fn test_empty_context_by_default() {
        reset_context();
        assert_eq!(get_current_context(), RunContext::default());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::LeadTimeMapping.to_string(), "lead_time_mapping");
        assert_eq!(RunPhase::DailyRollup.to_string(), "daily_rollup");
    }
}
