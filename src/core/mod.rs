//! Fact and derived record types shared by every stage.
//!
//! Facts (`Deployment`, `MergedChange`, `Incident`) are written by ingestion
//! and never modified by derivation. Derived records are rebuilt wholesale on
//! every run.

pub mod time;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment status values that count as a failed rollout.
pub const FAILURE_STATUSES: &[&str] = &["failure", "error"];

/// Status recorded for deployments without any status history.
pub const UNKNOWN_STATUS: &str = "unknown";

/// A deployment to the tracked environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub environment: String,
    pub created_at: Option<DateTime<Utc>>,
    /// First time the status history reported success, or the latest status
    /// timestamp when success was never reported.
    pub finished_at: Option<DateTime<Utc>>,
    /// Latest status state reported by the host.
    pub status: String,
    pub actor: Option<String>,
    pub commit_sha: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub log_url: Option<String>,
}

impl Deployment {
    /// True when the raw platform status is an explicit failure state.
    pub fn has_failure_status(&self) -> bool {
        FAILURE_STATUSES.contains(&self.status.as_str())
    }
}

/// A merged pull request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedChange {
    pub number: i64,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub author: Option<String>,
}

/// A resolved production incident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub duration_minutes: f64,
}

impl Incident {
    /// Build an incident, deriving its duration from the open/close span.
    pub fn from_span(
        id: impl Into<String>,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let duration_minutes = (closed_at - created_at).num_milliseconds() as f64 / 60_000.0;
        Self {
            id: id.into(),
            title: title.into(),
            created_at,
            closed_at,
            duration_minutes,
        }
    }
}

/// Commit range between two consecutive finished deployments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployWindow {
    pub window_id: i64,
    pub prev_sha: String,
    pub curr_sha: String,
    pub deployed_at: DateTime<Utc>,
}

/// Lead-time attribution of one merged change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeRecord {
    pub change_number: i64,
    pub first_deployed_at: Option<DateTime<Utc>>,
    pub lead_time_hours: f64,
    pub window_prev_sha: Option<String>,
    pub window_curr_sha: Option<String>,
}

impl LeadTimeRecord {
    /// Record for a change that no window could claim.
    pub fn unattributed(change_number: i64) -> Self {
        Self {
            change_number,
            first_deployed_at: None,
            lead_time_hours: 0.0,
            window_prev_sha: None,
            window_curr_sha: None,
        }
    }

    /// False for the zero-lead-time placeholder of an unattributed change.
    pub fn is_attributed(&self) -> bool {
        self.first_deployed_at.is_some()
    }
}

/// Why a deployment was (or was not) classified as failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfrReason {
    None,
    SentryWindow,
    GhStatusFailure,
}

impl CfrReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SentryWindow => "sentry_window",
            Self::GhStatusFailure => "gh_status_failure",
        }
    }
}

impl fmt::Display for CfrReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CfrReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "sentry_window" => Ok(Self::SentryWindow),
            "gh_status_failure" => Ok(Self::GhStatusFailure),
            other => Err(format!("unknown CFR reason: {other}")),
        }
    }
}

/// Failure classification of one deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfrRecord {
    pub deployment_id: i64,
    pub failed: bool,
    pub reason: CfrReason,
}

impl CfrRecord {
    pub fn healthy(deployment_id: i64) -> Self {
        Self {
            deployment_id,
            failed: false,
            reason: CfrReason::None,
        }
    }

    pub fn failed(deployment_id: i64, reason: CfrReason) -> Self {
        Self {
            deployment_id,
            failed: true,
            reason,
        }
    }
}

/// One row of the per-day rollup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub deploy_count: i64,
    pub failed_deploy_count: i64,
    pub change_failure_rate: f64,
    /// Sum of the day's lead-time hours (not a mean).
    pub avg_lead_time_hours: f64,
    /// Sum of the day's incident durations.
    pub mttr_minutes: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Deployment,
    ChangeMerge,
    Incident,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::ChangeMerge => "change_merge",
            Self::Incident => "incident",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployment" => Ok(Self::Deployment),
            "change_merge" => Ok(Self::ChangeMerge),
            "incident" => Ok(Self::Incident),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Denormalized entry of the unified event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub kind: EventKind,
    pub when: Option<DateTime<Utc>>,
    pub sha: Option<String>,
    pub change_number: Option<i64>,
    pub deployment_id: Option<i64>,
    pub incident_id: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
}
