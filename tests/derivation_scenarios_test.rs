//! End-to-end derivation over an in-memory store with static collaborators.

use chrono::Duration;
use dora_metrics::core::{CfrReason, CfrRecord};
use dora_metrics::derive::{run_derivation, DerivationContext};
use dora_metrics::sources::{SignalKind, SignalSource};
use dora_metrics::store::{DoraStore, IngestRun};
use dora_metrics::testkit::{
    change, deployment, incident, ts, StaticRangeOracle, StaticSignalSource,
};
use dora_metrics::Deployment;
use pretty_assertions::assert_eq;

fn store_with(deployments: &[Deployment]) -> DoraStore {
    let mut store = DoraStore::open_in_memory().unwrap();
    let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
    store.upsert_deployments(deployments, &run).unwrap();
    store
}

fn context<'a>(
    oracle: &'a StaticRangeOracle,
    signals: Option<&'a StaticSignalSource>,
) -> DerivationContext<'a> {
    DerivationContext {
        environment: "production",
        cfr_window: Duration::minutes(120),
        oracle,
        signals: signals.map(|s| s as &dyn SignalSource),
        release_environment: "production",
    }
}

#[test]
fn test_window_and_lead_time_scenario() {
    let mut store = store_with(&[
        deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success"),
        deployment(2, "b2", Some("2024-01-02T00:00:00Z"), "success"),
    ]);
    let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
    store
        .upsert_changes(&[change(11, Some("2024-01-01T12:00:00Z"), Some("c3"))], &run)
        .unwrap();
    let oracle = StaticRangeOracle::new().with_range("a1", "b2", ["c3", "d4"]);

    let report = run_derivation(&mut store, &context(&oracle, None)).unwrap();
    assert_eq!(report.windows, 1);

    let windows = store.load_windows().unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].prev_sha, "a1");
    assert_eq!(windows[0].curr_sha, "b2");
    assert_eq!(windows[0].deployed_at, ts("2024-01-02T00:00:00Z"));

    let lead_times = store.load_lead_times().unwrap();
    assert_eq!(lead_times.len(), 1);
    assert_eq!(lead_times[0].change_number, 11);
    assert_eq!(lead_times[0].lead_time_hours, 12.0);
}

#[test]
fn test_status_fallback_scenarios() {
    let oracle = StaticRangeOracle::new();
    let quiet = StaticSignalSource::new();

    let mut store = store_with(&[deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success")]);
    run_derivation(&mut store, &context(&oracle, Some(&quiet))).unwrap();
    assert_eq!(store.load_cfr().unwrap(), vec![CfrRecord::healthy(1)]);

    let mut store = store_with(&[deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "failure")]);
    run_derivation(&mut store, &context(&oracle, Some(&quiet))).unwrap();
    assert_eq!(
        store.load_cfr().unwrap(),
        vec![CfrRecord::failed(1, CfrReason::GhStatusFailure)]
    );
}

#[test]
fn test_incident_thirty_minutes_after_deploy_marks_failure() {
    let oracle = StaticRangeOracle::new();
    let signals = StaticSignalSource::new().with_signal(
        "inc-1",
        SignalKind::Incident,
        ts("2024-01-01T00:30:00Z"),
    );
    for status in ["success", "failure", "inactive"] {
        let mut store =
            store_with(&[deployment(1, "a1", Some("2024-01-01T00:00:00Z"), status)]);
        run_derivation(&mut store, &context(&oracle, Some(&signals))).unwrap();
        assert_eq!(
            store.load_cfr().unwrap(),
            vec![CfrRecord::failed(1, CfrReason::SentryWindow)],
            "status {status}"
        );
    }
}

#[test]
fn test_fewer_than_two_deployments_clear_windows_and_lead_times() {
    let oracle = StaticRangeOracle::new().with_range("a1", "b2", ["c3"]);
    let mut store = store_with(&[
        deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success"),
        deployment(2, "b2", Some("2024-01-02T00:00:00Z"), "success"),
    ]);
    let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
    store
        .upsert_changes(&[change(1, Some("2024-01-01T06:00:00Z"), Some("c3"))], &run)
        .unwrap();
    run_derivation(&mut store, &context(&oracle, None)).unwrap();
    assert_eq!(store.load_lead_times().unwrap().len(), 1);

    // Second deployment loses its completion time on re-ingestion.
    store
        .upsert_deployments(&[deployment(2, "b2", None, "in_progress")], &run)
        .unwrap();
    let report = run_derivation(&mut store, &context(&oracle, None)).unwrap();
    assert_eq!(report.windows, 0);
    assert!(store.load_windows().unwrap().is_empty());
    assert!(store.load_lead_times().unwrap().is_empty());
    assert_eq!(store.load_cfr().unwrap(), vec![CfrRecord::healthy(1)]);
}

#[test]
fn test_daily_lead_time_sums_the_days_changes() {
    let oracle = StaticRangeOracle::new().with_range("a1", "b2", ["c1", "c2"]);
    let mut store = store_with(&[
        deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success"),
        deployment(2, "b2", Some("2024-01-03T00:00:00Z"), "success"),
    ]);
    let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
    store
        .upsert_changes(
            &[
                change(1, Some("2024-01-02T00:00:00Z"), Some("c1")),
                change(2, Some("2024-01-02T12:00:00Z"), Some("c2")),
            ],
            &run,
        )
        .unwrap();

    run_derivation(&mut store, &context(&oracle, None)).unwrap();
    let summaries = store.load_summaries().unwrap();
    let jan2 = summaries
        .iter()
        .find(|s| s.date.to_string() == "2024-01-02")
        .unwrap();
    // 24h + 12h summed, not averaged to 18h.
    assert_eq!(jan2.avg_lead_time_hours, 36.0);
    assert_eq!(jan2.deploy_count, 0);
    assert_eq!(jan2.change_failure_rate, 0.0);
}

#[test]
fn test_mttr_and_events_from_incidents() {
    let oracle = StaticRangeOracle::new();
    let mut store = store_with(&[deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success")]);
    let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
    store
        .upsert_incidents(
            &[
                incident("7", "2024-01-05T10:00:00Z", "2024-01-05T10:20:00Z"),
                incident("8", "2024-01-05T11:00:00Z", "2024-01-05T11:40:00Z"),
            ],
            &run,
        )
        .unwrap();
    let report = run_derivation(&mut store, &context(&oracle, None)).unwrap();
    assert_eq!(report.events, 3);

    let jan5 = store
        .load_summaries()
        .unwrap()
        .into_iter()
        .find(|s| s.date.to_string() == "2024-01-05")
        .unwrap();
    assert_eq!(jan5.mttr_minutes, 60.0);
}

#[test]
fn test_derivation_is_idempotent() {
    let oracle = StaticRangeOracle::new()
        .with_range("a1", "b2", ["c1"])
        .with_range("b2", "c3", ["c2", "c1"]);
    let signals = StaticSignalSource::new().with_signal(
        "i",
        SignalKind::Issue,
        ts("2024-01-02T01:00:00Z"),
    );
    let mut store = store_with(&[
        deployment(1, "a1", Some("2024-01-01T00:00:00Z"), "success"),
        deployment(2, "b2", Some("2024-01-02T00:00:00Z"), "success"),
        deployment(3, "c3", Some("2024-01-03T00:00:00Z"), "failure"),
    ]);
    let run = IngestRun::starting_at(ts("2024-02-01T00:00:00Z"));
    store
        .upsert_changes(
            &[
                change(1, Some("2024-01-01T01:00:00Z"), Some("c1")),
                change(2, Some("2024-01-02T01:00:00Z"), Some("c2")),
                change(3, Some("2024-01-02T02:00:00Z"), Some("zz")),
            ],
            &run,
        )
        .unwrap();
    store
        .upsert_incidents(
            &[incident("9", "2024-01-02T01:00:00Z", "2024-01-02T02:00:00Z")],
            &run,
        )
        .unwrap();

    let derived = [
        "derived_deploy_window",
        "derived_change_lead_time",
        "derived_cfr_per_deploy",
        "dora_summary_daily",
        "dora_events",
    ];
    let snapshot = |store: &DoraStore| -> String {
        let tables: Vec<_> = derived
            .iter()
            .map(|t| store.table_rows(t).unwrap())
            .collect();
        serde_json::to_string(&tables).unwrap()
    };

    run_derivation(&mut store, &context(&oracle, Some(&signals))).unwrap();
    let first = snapshot(&store);
    run_derivation(&mut store, &context(&oracle, Some(&signals))).unwrap();
    let second = snapshot(&store);
    assert_eq!(first, second);

    let cfr = store.load_cfr().unwrap();
    assert_eq!(
        cfr,
        vec![
            CfrRecord::healthy(1),
            CfrRecord::failed(2, CfrReason::SentryWindow),
            CfrRecord::failed(3, CfrReason::GhStatusFailure),
        ]
    );
}
