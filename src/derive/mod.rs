//! Derivation: turn stored facts into windows, lead times, failure
//! classifications, daily summaries and the event stream.
//!
//! Every derived table is rebuilt from the facts on each run, so running
//! twice over unchanged facts leaves identical tables.

pub mod failure;
pub mod lead_time;
pub mod rollup;
pub mod windows;

use chrono::Duration;

use crate::errors::Result;
use crate::observability::RunPhase;
use crate::pipeline::{run_stage, PureStage};
use crate::sources::{RangeOracle, SignalSource};
use crate::store::DoraStore;

pub use failure::{FailureClassifier, ObservationWindow};
pub use lead_time::{LeadTimeInput, LeadTimeMapper};
pub use rollup::{daily_summaries, event_stream, EventInput, RollupInput};
pub use windows::build_windows;

/// Collaborators and tunables for one derivation run.
pub struct DerivationContext<'a> {
    /// Deployment environment the run is scoped to
    pub environment: &'a str,
    pub cfr_window: Duration,
    pub oracle: &'a dyn RangeOracle,
    /// Error tracker; `None` restricts classification to deployment status
    pub signals: Option<&'a dyn SignalSource>,
    /// Error-tracker environment whose release deploys are considered
    pub release_environment: &'a str,
}

/// Row counts written by a derivation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationReport {
    pub windows: usize,
    pub lead_times: usize,
    pub attributed_changes: usize,
    pub classified_deployments: usize,
    pub failed_deployments: usize,
    pub summary_days: usize,
    pub events: usize,
}

/// Rebuild every derived table from the facts in `store`.
pub fn run_derivation(store: &mut DoraStore, ctx: &DerivationContext<'_>) -> Result<DerivationReport> {
    let mut report = DerivationReport::default();
    let deployments = store.load_deployments(Some(ctx.environment))?;
    let changes = store.load_changes()?;
    let incidents = store.load_incidents()?;

    let windows = run_stage(
        &PureStage::new("build windows", build_windows),
        RunPhase::WindowBuilding,
        deployments.clone(),
    )?;
    let lead_times = if windows.is_empty() {
        tracing::warn!(
            environment = ctx.environment,
            "Not enough finished deployments to form windows (need at least 2); clearing windows and lead times"
        );
        store.clear_windows_and_lead_times()?;
        Vec::new()
    } else {
        store.replace_windows(&windows)?;
        let records = run_stage(
            &LeadTimeMapper::new(ctx.oracle),
            RunPhase::LeadTimeMapping,
            LeadTimeInput {
                windows: windows.clone(),
                changes: changes.clone(),
            },
        )?;
        store.replace_lead_times(&records)?;
        records
    };
    report.windows = windows.len();
    report.lead_times = lead_times.len();
    report.attributed_changes = lead_times.iter().filter(|r| r.is_attributed()).count();

    let classifier = FailureClassifier::new(ctx.signals, ctx.cfr_window, ctx.release_environment);
    let cfr = run_stage(&classifier, RunPhase::FailureClassification, deployments.clone())?;
    store.replace_cfr(&cfr)?;
    report.classified_deployments = cfr.len();
    report.failed_deployments = cfr.iter().filter(|r| r.failed).count();

    let summaries = run_stage(
        &PureStage::new("daily rollup", daily_summaries),
        RunPhase::DailyRollup,
        RollupInput {
            deployments,
            cfr,
            changes: changes.clone(),
            lead_times,
            incidents: incidents.clone(),
        },
    )?;
    store.replace_summaries(&summaries)?;
    report.summary_days = summaries.len();
    tracing::info!(days = summaries.len(), "Rebuilt daily summary");

    let events = run_stage(
        &PureStage::new("event stream", event_stream),
        RunPhase::EventStream,
        EventInput {
            deployments: store.load_deployments(None)?,
            changes,
            incidents,
        },
    )?;
    store.replace_events(&events)?;
    report.events = events.len();
    tracing::info!(counts = ?rollup::event_counts(&events), "Rebuilt event stream");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IngestRun;
    use crate::testkit::{change, deployment, ts, StaticRangeOracle};

    #[test]
    fn test_single_deployment_clears_stale_windows() {
        let mut store = DoraStore::open_in_memory().unwrap();
        let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
        store
            .upsert_deployments(
                &[
                    deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success"),
                    deployment(2, "b2", Some("2024-01-02T00:00:00Z"), "success"),
                ],
                &run,
            )
            .unwrap();
        store
            .upsert_changes(&[change(1, Some("2024-01-01T06:00:00Z"), Some("c3"))], &run)
            .unwrap();
        let oracle = StaticRangeOracle::new().with_range("a1", "b2", ["c3"]);
        let ctx = DerivationContext {
            environment: "production",
            cfr_window: Duration::minutes(120),
            oracle: &oracle,
            signals: None,
            release_environment: "production",
        };

        let report = run_derivation(&mut store, &ctx).unwrap();
        assert_eq!(report.windows, 1);
        assert_eq!(report.attributed_changes, 1);

        let other_env = DerivationContext {
            environment: "staging",
            ..ctx
        };
        let report = run_derivation(&mut store, &other_env).unwrap();
        assert_eq!(report.windows, 0);
        assert!(store.load_windows().unwrap().is_empty());
        assert!(store.load_lead_times().unwrap().is_empty());
    }
}
