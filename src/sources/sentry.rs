//! Sentry REST client: resolved issues for MTTR and runtime signals for CFR.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use super::{IncidentSource, ReleaseDeploy, Signal, SignalKind, SignalSource};
use crate::config::{RetryConfig, SentryConfig};
use crate::core::time::{format_search_ts, parse_opt_ts};
use crate::core::Incident;
use crate::errors::{DoraError, Result};
use crate::io::http::{get_with_backoff, Clock, HttpClient, HttpRequest};

/// Sentry serializes ids as strings, older endpoints as numbers.
fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentryProject {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentryIssue {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default)]
    pub title: Option<String>,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub project: Option<SentryProject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentryIncident {
    #[serde(default)]
    pub id: serde_json::Value,
    pub date_created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentryRelease {
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentryReleaseDeploy {
    pub environment: Option<String>,
    pub date_started: Option<String>,
    pub date_finished: Option<String>,
}

/// Resolved issues of one project become incidents spanning first to last seen.
pub fn incidents_from_issues(issues: &[SentryIssue], project_name: &str) -> Vec<Incident> {
    issues
        .iter()
        .filter(|issue| {
            issue
                .project
                .as_ref()
                .and_then(|p| p.name.as_deref())
                == Some(project_name)
        })
        .filter_map(|issue| {
            let id = id_to_string(&issue.id)?;
            let created = parse_opt_ts(issue.first_seen.as_deref())?;
            let closed = parse_opt_ts(issue.last_seen.as_deref())?;
            Some(Incident::from_span(
                id,
                issue.title.clone().unwrap_or_default(),
                created,
                closed,
            ))
        })
        .collect()
}

/// Release deploys to `environment` finished at or after `since`, oldest first.
pub fn release_deploys(
    version: &str,
    deploys: &[SentryReleaseDeploy],
    environment: &str,
    since: DateTime<Utc>,
) -> Vec<ReleaseDeploy> {
    deploys
        .iter()
        .filter(|d| d.environment.as_deref() == Some(environment))
        .filter_map(|d| {
            let finished = d.date_finished.as_deref().or(d.date_started.as_deref());
            parse_opt_ts(finished)
        })
        .filter(|at| *at >= since)
        .map(|deployed_at| ReleaseDeploy {
            version: version.to_string(),
            deployed_at,
        })
        .collect()
}

/// Issue search query for issues first seen inside `[start, end]`.
pub fn issue_query(
    environment: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    release: Option<&str>,
) -> String {
    let mut query = format!(
        "environment:{} firstSeen:>={} firstSeen:<={}",
        environment,
        format_search_ts(&start),
        format_search_ts(&end)
    );
    if let Some(release) = release {
        query.push_str(&format!(" release:{release}"));
    }
    query
}

pub struct SentryClient {
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    token: String,
    org: String,
    project: String,
    project_name: String,
    environment: String,
    api_base: String,
    since: DateTime<Utc>,
}

impl SentryClient {
    /// Build a client from configuration; `None` when Sentry is not configured.
    pub fn from_config(
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        retry: RetryConfig,
        config: &SentryConfig,
        since: DateTime<Utc>,
    ) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            http,
            clock,
            retry,
            token: config.token.clone().unwrap_or_default(),
            org: config.org.clone().unwrap_or_default(),
            project: config.project.clone().unwrap_or_default(),
            project_name: config.effective_project_name().unwrap_or_default().to_string(),
            environment: config.environment.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            since,
        })
    }

    fn org_url(&self, path: &str) -> String {
        format!("{}/organizations/{}/{}", self.api_base, self.org, path)
    }

    /// Deploys endpoint of `version`, escaped as a single path segment.
    fn release_deploys_url(&self, version: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.org_url("releases/"))
            .map_err(|e| DoraError::config(format!("invalid Sentry API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| DoraError::config("Sentry API base cannot hold a path"))?
            .pop_if_empty()
            .push(version)
            .push("deploys")
            .push("");
        Ok(url.to_string())
    }

    fn get_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let request = request.header("Authorization", format!("Bearer {}", self.token));
        get_with_backoff(self.http.as_ref(), self.clock.as_ref(), &self.retry, &request)?.json()
    }

    fn incidents_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Signal>> {
        let request = HttpRequest::get(self.org_url("incidents/")).query("per_page", 100);
        let incidents: Vec<SentryIncident> = self.get_json(request)?;
        Ok(incidents
            .iter()
            .filter_map(|inc| {
                let created_at = parse_opt_ts(inc.date_created.as_deref())?;
                let id = id_to_string(&inc.id).unwrap_or_default();
                (start <= created_at && created_at <= end).then_some(Signal {
                    id,
                    kind: SignalKind::Incident,
                    created_at,
                })
            })
            .collect())
    }

    fn issues_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        release: Option<&str>,
    ) -> Result<Vec<Signal>> {
        let request = HttpRequest::get(self.org_url("issues/"))
            .query("project", &self.project)
            .query("query", issue_query(&self.environment, start, end, release))
            .query("per_page", 50);
        let issues: Vec<SentryIssue> = self.get_json(request)?;
        Ok(issues
            .iter()
            .filter_map(|issue| {
                Some(Signal {
                    id: id_to_string(&issue.id).unwrap_or_default(),
                    kind: SignalKind::Issue,
                    created_at: parse_opt_ts(issue.first_seen.as_deref())?,
                })
            })
            .collect())
    }
}

impl SignalSource for SentryClient {
    fn signals_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        release: Option<&str>,
    ) -> Result<Vec<Signal>> {
        if release.is_some() {
            return self.issues_between(start, end, release);
        }
        match (
            self.incidents_between(start, end),
            self.issues_between(start, end, None),
        ) {
            (Err(incident_err), Err(issue_err)) => {
                tracing::debug!(error = %issue_err, "Sentry issue query failed");
                Err(incident_err)
            }
            (incidents, issues) => {
                for err in [incidents.as_ref().err(), issues.as_ref().err()]
                    .into_iter()
                    .flatten()
                {
                    tracing::debug!(error = %err, "Partial Sentry signal query failure");
                }
                let mut signals = incidents.unwrap_or_default();
                signals.extend(issues.unwrap_or_default());
                Ok(signals)
            }
        }
    }

    fn recent_releases(&self, environment: &str) -> Result<Vec<ReleaseDeploy>> {
        let request = HttpRequest::get(self.org_url("releases/")).query("per_page", 100);
        let releases: Vec<SentryRelease> = self.get_json(request)?;

        let mut out = Vec::new();
        for version in releases.iter().filter_map(|r| r.version.as_deref()) {
            let url = self.release_deploys_url(version)?;
            let deploys: Vec<SentryReleaseDeploy> = match self.get_json(HttpRequest::get(url)) {
                Ok(deploys) => deploys,
                Err(err) => {
                    tracing::warn!(release = version, error = %err, "Skipping release whose deploys could not be fetched");
                    continue;
                }
            };
            out.extend(release_deploys(version, &deploys, environment, self.since));
        }
        out.sort_by(|a, b| a.deployed_at.cmp(&b.deployed_at));
        Ok(out)
    }
}

impl IncidentSource for SentryClient {
    fn resolved_incidents(&self) -> Result<Vec<Incident>> {
        let request = HttpRequest::get(self.org_url("issues/"))
            .query("query", "is:resolved")
            .query("per_page", 100);
        let issues: Vec<SentryIssue> = self.get_json(request)?;
        let incidents = incidents_from_issues(&issues, &self.project_name);
        if incidents.is_empty() && !issues.is_empty() {
            tracing::warn!(
                project = %self.project_name,
                "Resolved issues found but none belong to the configured project"
            );
        }
        tracing::info!(count = incidents.len(), "Fetched resolved Sentry issues");
        Ok(incidents)
    }
}
