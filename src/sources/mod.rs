//! External collaborators: the source-control host and the error tracker.
//!
//! The derivation stages only see the traits defined here. [`github`] and
//! [`sentry`] implement them over HTTP; the `testkit` module provides
//! in-memory versions.

pub mod github;
pub mod sentry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::{Deployment, Incident, MergedChange};
use crate::errors::Result;

/// Commit-range membership oracle.
pub trait RangeOracle {
    /// Commits reachable in `prev_sha..curr_sha`, excluding `prev_sha`.
    fn members_between(&self, prev_sha: &str, curr_sha: &str) -> Result<BTreeSet<String>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Incident,
    Issue,
}

/// A runtime error signal reported by the error tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub kind: SignalKind,
    pub created_at: DateTime<Utc>,
}

/// A release the error tracker saw deployed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDeploy {
    pub version: String,
    pub deployed_at: DateTime<Utc>,
}

/// Error-tracker queries used by the failure classifier.
pub trait SignalSource {
    /// Signals created within `[start, end]`.
    ///
    /// Without a release this covers incidents and newly seen issues; with a
    /// release only issues attributed to that release are returned.
    fn signals_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        release: Option<&str>,
    ) -> Result<Vec<Signal>>;

    /// Release deploys to `environment`, oldest first.
    fn recent_releases(&self, environment: &str) -> Result<Vec<ReleaseDeploy>>;
}

/// Facts pulled from the source-control host.
pub trait ChangeSource {
    fn deployments(&self) -> Result<Vec<Deployment>>;
    fn merged_changes(&self) -> Result<Vec<MergedChange>>;
}

/// Resolved incidents pulled from the error tracker.
pub trait IncidentSource {
    fn resolved_incidents(&self) -> Result<Vec<Incident>>;
}
