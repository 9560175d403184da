//! Ingestion: pull facts from the sources and upsert them into the store.
//!
//! A source that fails is logged and skipped; derivation still runs over
//! whatever facts the store already holds. Store errors are fatal.

use crate::errors::Result;
use crate::observability::{set_phase, RunPhase};
use crate::sources::{ChangeSource, IncidentSource};
use crate::store::{DoraStore, IngestRun};

/// How one source fared during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Ingested(usize),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub run: IngestRun,
    pub deployments: SourceOutcome,
    pub changes: SourceOutcome,
    pub incidents: SourceOutcome,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        [&self.deployments, &self.changes, &self.incidents]
            .iter()
            .any(|o| matches!(o, SourceOutcome::Failed(_)))
    }
}

fn ingest_one<T>(
    what: &str,
    fetch: impl FnOnce() -> Result<Vec<T>>,
    write: impl FnOnce(&[T]) -> Result<usize>,
) -> Result<SourceOutcome> {
    match fetch() {
        Ok(items) => {
            let written = write(&items)?;
            tracing::info!(source = what, count = written, "Ingested");
            Ok(SourceOutcome::Ingested(written))
        }
        Err(err) => {
            tracing::error!(source = what, "Ingestion failed; continuing with stored facts: {}", err);
            Ok(SourceOutcome::Failed(err.to_string()))
        }
    }
}

/// Fetch deployments, merged changes and (when configured) incidents.
pub fn ingest_all(
    store: &mut DoraStore,
    changes: &dyn ChangeSource,
    incidents: Option<&dyn IncidentSource>,
    run: &IngestRun,
) -> Result<IngestReport> {
    let _phase = set_phase(RunPhase::Ingestion);
    tracing::info!(run_id = %run.run_id, "Starting ingestion");

    let deployments = ingest_one(
        "deployments",
        || changes.deployments(),
        |items| store.upsert_deployments(items, run),
    )?;
    let merged = ingest_one(
        "merged changes",
        || changes.merged_changes(),
        |items| store.upsert_changes(items, run),
    )?;
    let incidents = match incidents {
        Some(source) => ingest_one(
            "incidents",
            || source.resolved_incidents(),
            |items| store.upsert_incidents(items, run),
        )?,
        None => {
            tracing::info!("Error tracker credentials not provided; skipping incident ingestion");
            SourceOutcome::Skipped
        }
    };

    Ok(IngestReport {
        run: run.clone(),
        deployments,
        changes: merged,
        incidents,
    })
}
