use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::core::{Deployment, Incident, MergedChange};
use crate::errors::{DoraError, Result};
use crate::sources::{
    ChangeSource, IncidentSource, RangeOracle, ReleaseDeploy, Signal, SignalKind, SignalSource,
};

fn unavailable(what: &str) -> DoraError {
    DoraError::Status {
        url: format!("static://{what}"),
        status: 503,
    }
}

/// Range oracle answering from a fixed table. Unknown ranges are empty.
#[derive(Default)]
pub struct StaticRangeOracle {
    ranges: HashMap<(String, String), BTreeSet<String>>,
    failing: BTreeSet<(String, String)>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StaticRangeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range<I, S>(mut self, prev: &str, curr: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ranges.insert(
            (prev.to_string(), curr.to_string()),
            members.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn failing_on(mut self, prev: &str, curr: &str) -> Self {
        self.failing.insert((prev.to_string(), curr.to_string()));
        self
    }

    /// Ranges queried so far, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl RangeOracle for StaticRangeOracle {
    fn members_between(&self, prev_sha: &str, curr_sha: &str) -> Result<BTreeSet<String>> {
        let key = (prev_sha.to_string(), curr_sha.to_string());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        if self.failing.contains(&key) {
            return Err(unavailable("compare"));
        }
        Ok(self.ranges.get(&key).cloned().unwrap_or_default())
    }
}

/// Error tracker serving fixed signals and releases.
#[derive(Default)]
pub struct StaticSignalSource {
    signals: Vec<Signal>,
    release_signals: HashMap<String, Vec<Signal>>,
    releases: Vec<ReleaseDeploy>,
    fail_signals: bool,
    fail_releases: bool,
    window_queries: Mutex<usize>,
}

impl StaticSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, id: &str, kind: SignalKind, created_at: DateTime<Utc>) -> Self {
        self.signals.push(Signal {
            id: id.to_string(),
            kind,
            created_at,
        });
        self
    }

    pub fn with_release(mut self, version: &str, deployed_at: DateTime<Utc>) -> Self {
        self.releases.push(ReleaseDeploy {
            version: version.to_string(),
            deployed_at,
        });
        self.releases.sort_by(|a, b| a.deployed_at.cmp(&b.deployed_at));
        self
    }

    pub fn with_release_issue(mut self, version: &str, id: &str, created_at: DateTime<Utc>) -> Self {
        self.release_signals
            .entry(version.to_string())
            .or_default()
            .push(Signal {
                id: id.to_string(),
                kind: SignalKind::Issue,
                created_at,
            });
        self
    }

    pub fn failing_signals(mut self) -> Self {
        self.fail_signals = true;
        self
    }

    pub fn failing_releases(mut self) -> Self {
        self.fail_releases = true;
        self
    }

    /// Number of `signals_in_window` calls served.
    pub fn window_queries(&self) -> usize {
        self.window_queries.lock().map(|n| *n).unwrap_or_default()
    }
}

impl SignalSource for StaticSignalSource {
    fn signals_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        release: Option<&str>,
    ) -> Result<Vec<Signal>> {
        if let Ok(mut n) = self.window_queries.lock() {
            *n += 1;
        }
        if self.fail_signals {
            return Err(unavailable("signals"));
        }
        let pool = match release {
            Some(version) => self.release_signals.get(version).cloned().unwrap_or_default(),
            None => self.signals.clone(),
        };
        Ok(pool
            .into_iter()
            .filter(|s| start <= s.created_at && s.created_at <= end)
            .collect())
    }

    fn recent_releases(&self, _environment: &str) -> Result<Vec<ReleaseDeploy>> {
        if self.fail_releases {
            return Err(unavailable("releases"));
        }
        Ok(self.releases.clone())
    }
}

/// Source-control host serving fixed facts.
#[derive(Default)]
pub struct StaticChangeSource {
    pub deployments: Vec<Deployment>,
    pub changes: Vec<MergedChange>,
    pub fail_deployments: bool,
    pub fail_changes: bool,
}

impl ChangeSource for StaticChangeSource {
    fn deployments(&self) -> Result<Vec<Deployment>> {
        if self.fail_deployments {
            return Err(unavailable("deployments"));
        }
        Ok(self.deployments.clone())
    }

    fn merged_changes(&self) -> Result<Vec<MergedChange>> {
        if self.fail_changes {
            return Err(unavailable("pulls"));
        }
        Ok(self.changes.clone())
    }
}

#[derive(Default)]
pub struct StaticIncidentSource {
    pub incidents: Vec<Incident>,
    pub fail: bool,
}

impl IncidentSource for StaticIncidentSource {
    fn resolved_incidents(&self) -> Result<Vec<Incident>> {
        if self.fail {
            return Err(unavailable("incidents"));
        }
        Ok(self.incidents.clone())
    }
}
