//! Observability infrastructure for logging and crash reports.
//!
//! - **Logging**: `tracing` subscriber filtered by `RUST_LOG`, then
//!   `LOG_LEVEL`, then the CLI verbosity.
//! - **Panic Hook**: structured crash report naming the run phase.
//! - **Context Tracking**: thread-local run phase and current record.
//!
//! ```ignore
//! use dora_metrics::observability::{install_panic_hook, set_phase, RunPhase};
//!
//! install_panic_hook();
//! let _phase = set_phase(RunPhase::FailureClassification);
//! ```

pub mod context;
pub mod logging;
pub mod panic_hook;

pub use context::{
    get_current_context, get_progress, increment_processed, reset_context, set_current_record,
    set_phase, set_progress, ContextGuard, RunContext, RunPhase,
};
pub use logging::{filter_directive, init_logging};
pub use panic_hook::install_panic_hook;
