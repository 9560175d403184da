// Export modules for library usage
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod derive;
pub mod errors;
pub mod ingest;
pub mod io;
pub mod observability;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod testkit;

// Re-export commonly used types
pub use crate::core::{
    CfrReason, CfrRecord, DailySummary, DeployWindow, Deployment, Event, EventKind, Incident,
    LeadTimeRecord, MergedChange,
};

pub use crate::config::DoraConfig;

pub use crate::derive::{run_derivation, DerivationContext, DerivationReport};

pub use crate::errors::{DoraError, Result};

pub use crate::ingest::{ingest_all, IngestReport, SourceOutcome};

pub use crate::sources::{ChangeSource, IncidentSource, RangeOracle, SignalSource};

pub use crate::store::{DoraStore, IngestRun};
