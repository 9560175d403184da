//! Change-failure classification of finished deployments.
//!
//! Tiers are evaluated in order and the first one that fires wins:
//!
//! 1. an error-tracker incident or issue created in the observation window
//! 2. an issue attributed to a release deployed inside the window
//! 3. a raw deployment status of `failure` or `error`
//!
//! Anything else is healthy. Tiers 1 and 2 need a [`SignalSource`]; without
//! one only the status fallback applies.

use chrono::{DateTime, Duration, Utc};

use crate::core::{CfrReason, CfrRecord, Deployment};
use crate::observability::{increment_processed, set_current_record, set_progress};
use crate::pipeline::Stage;
use crate::sources::{ReleaseDeploy, Signal, SignalSource};

/// Closed observation interval after a deployment finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ObservationWindow {
    pub fn after(finished_at: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: finished_at,
            end: finished_at + length,
        }
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start <= *at && *at <= self.end
    }

    fn any_signal(&self, signals: &[Signal]) -> bool {
        signals.iter().any(|s| self.contains(&s.created_at))
    }
}

pub struct FailureClassifier<'a> {
    signals: Option<&'a dyn SignalSource>,
    window: Duration,
    release_environment: String,
}

impl<'a> FailureClassifier<'a> {
    pub fn new(
        signals: Option<&'a dyn SignalSource>,
        window: Duration,
        release_environment: impl Into<String>,
    ) -> Self {
        Self {
            signals,
            window,
            release_environment: release_environment.into(),
        }
    }

    fn releases(&self, source: &dyn SignalSource) -> Vec<ReleaseDeploy> {
        match source.recent_releases(&self.release_environment) {
            Ok(releases) => releases,
            Err(err) => {
                tracing::warn!("Release listing unavailable; skipping release tier: {}", err);
                Vec::new()
            }
        }
    }

    fn direct_signal(&self, source: &dyn SignalSource, window: &ObservationWindow) -> bool {
        match source.signals_in_window(window.start, window.end, None) {
            Ok(signals) => window.any_signal(&signals),
            Err(err) => {
                tracing::warn!("Signal query failed; treating as no evidence: {}", err);
                false
            }
        }
    }

    fn release_signal(
        &self,
        source: &dyn SignalSource,
        window: &ObservationWindow,
        releases: &[ReleaseDeploy],
    ) -> bool {
        releases
            .iter()
            .filter(|r| window.contains(&r.deployed_at))
            .any(|release| {
                match source.signals_in_window(window.start, window.end, Some(&release.version)) {
                    Ok(signals) => window.any_signal(&signals),
                    Err(err) => {
                        tracing::warn!(
                            release = %release.version,
                            "Release issue query failed; treating as no evidence: {}",
                            err
                        );
                        false
                    }
                }
            })
    }

    /// Classify one finished deployment.
    pub fn classify(
        &self,
        deployment: &Deployment,
        finished_at: DateTime<Utc>,
        releases: &[ReleaseDeploy],
    ) -> CfrRecord {
        let window = ObservationWindow::after(finished_at, self.window);
        if let Some(source) = self.signals {
            if self.direct_signal(source, &window) || self.release_signal(source, &window, releases)
            {
                return CfrRecord::failed(deployment.id, CfrReason::SentryWindow);
            }
        }
        if deployment.has_failure_status() {
            return CfrRecord::failed(deployment.id, CfrReason::GhStatusFailure);
        }
        CfrRecord::healthy(deployment.id)
    }
}

impl Stage for FailureClassifier<'_> {
    type Input = Vec<Deployment>;
    type Output = Vec<CfrRecord>;
    type Error = std::convert::Infallible;

    fn execute(&self, deployments: Vec<Deployment>) -> Result<Self::Output, Self::Error> {
        let mut finished: Vec<(&Deployment, DateTime<Utc>)> = deployments
            .iter()
            .filter_map(|d| d.finished_at.map(|at| (d, at)))
            .collect();
        finished.sort_by_key(|(d, _)| d.id);

        let releases = match self.signals {
            Some(source) if !finished.is_empty() => self.releases(source),
            _ => Vec::new(),
        };
        if self.signals.is_none() {
            tracing::info!("No error tracker configured; classifying by deployment status only");
        }

        set_progress(0, finished.len());
        let records: Vec<CfrRecord> = finished
            .into_iter()
            .map(|(deployment, finished_at)| {
                let _record = set_current_record(format!("deployment {}", deployment.id));
                increment_processed();
                self.classify(deployment, finished_at, &releases)
            })
            .collect();

        let failed = records.iter().filter(|r| r.failed).count();
        tracing::info!(classified = records.len(), failed, "Classified deployments");
        Ok(records)
    }

    fn name(&self) -> &str {
        "classify failures"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SignalKind;
    use crate::testkit::{deployment, ts, StaticSignalSource};

    const T: &str = "2024-03-01T10:00:00Z";

    fn classify(source: Option<&StaticSignalSource>, deployments: Vec<Deployment>) -> Vec<CfrRecord> {
        let source = source.map(|s| s as &dyn SignalSource);
        FailureClassifier::new(source, Duration::minutes(120), "production")
            .execute(deployments)
            .unwrap()
    }

    #[test]
    fn test_healthy_without_signal_or_failure_status() {
        let source = StaticSignalSource::new();
        let records = classify(Some(&source), vec![deployment(1, "a", Some(T), "success")]);
        assert_eq!(records, vec![CfrRecord::healthy(1)]);
    }

    #[test]
    fn test_failure_status_falls_back() {
        let source = StaticSignalSource::new();
        let records = classify(Some(&source), vec![deployment(1, "a", Some(T), "failure")]);
        assert_eq!(records, vec![CfrRecord::failed(1, CfrReason::GhStatusFailure)]);
        let records = classify(None, vec![deployment(2, "a", Some(T), "error")]);
        assert_eq!(records, vec![CfrRecord::failed(2, CfrReason::GhStatusFailure)]);
    }

    #[test]
    fn test_incident_in_window_wins_over_status() {
        let source = StaticSignalSource::new().with_signal(
            "inc-1",
            SignalKind::Incident,
            ts("2024-03-01T10:30:00Z"),
        );
        for status in ["success", "failure"] {
            let records = classify(Some(&source), vec![deployment(1, "a", Some(T), status)]);
            assert_eq!(records, vec![CfrRecord::failed(1, CfrReason::SentryWindow)]);
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let at_end = StaticSignalSource::new().with_signal(
            "i",
            SignalKind::Issue,
            ts("2024-03-01T12:00:00Z"),
        );
        let records = classify(Some(&at_end), vec![deployment(1, "a", Some(T), "success")]);
        assert!(records[0].failed);

        let after_end = StaticSignalSource::new().with_signal(
            "i",
            SignalKind::Issue,
            ts("2024-03-01T12:00:01Z"),
        );
        let records = classify(Some(&after_end), vec![deployment(1, "a", Some(T), "success")]);
        assert!(!records[0].failed);
    }

    #[test]
    fn test_release_issue_in_window_fires_second_tier() {
        let source = StaticSignalSource::new()
            .with_release("v2", ts("2024-03-01T10:05:00Z"))
            .with_release_issue("v2", "iss-9", ts("2024-03-01T11:00:00Z"));
        let records = classify(Some(&source), vec![deployment(1, "a", Some(T), "success")]);
        assert_eq!(records, vec![CfrRecord::failed(1, CfrReason::SentryWindow)]);
    }

    #[test]
    fn test_release_outside_window_is_ignored() {
        let source = StaticSignalSource::new()
            .with_release("v2", ts("2024-03-02T10:05:00Z"))
            .with_release_issue("v2", "iss-9", ts("2024-03-01T11:00:00Z"));
        let records = classify(Some(&source), vec![deployment(1, "a", Some(T), "success")]);
        assert_eq!(records, vec![CfrRecord::healthy(1)]);
        assert_eq!(source.window_queries(), 1);
    }

    #[test]
    fn test_signal_failure_degrades_to_status() {
        let source = StaticSignalSource::new().failing_signals().failing_releases();
        let records = classify(
            Some(&source),
            vec![
                deployment(1, "a", Some(T), "success"),
                deployment(2, "b", Some(T), "failure"),
            ],
        );
        assert_eq!(
            records,
            vec![
                CfrRecord::healthy(1),
                CfrRecord::failed(2, CfrReason::GhStatusFailure)
            ]
        );
    }

    #[test]
    fn test_unfinished_deployments_are_not_classified() {
        let records = classify(
            None,
            vec![
                deployment(3, "c", Some(T), "success"),
                deployment(1, "a", None, "failure"),
                deployment(2, "b", Some(T), "success"),
            ],
        );
        let ids: Vec<i64> = records.iter().map(|r| r.deployment_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
