//! GitHub REST client: deployments, merged pull requests and commit ranges.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{ChangeSource, RangeOracle};
use crate::config::{GithubTarget, RetryConfig};
use crate::core::time::parse_opt_ts;
use crate::core::{Deployment, MergedChange, UNKNOWN_STATUS};
use crate::errors::Result;
use crate::io::http::{get_with_backoff, Clock, HttpClient, HttpRequest};

const PER_PAGE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct GhUser {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhDeployment {
    pub id: i64,
    pub sha: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub creator: Option<GhUser>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhDeploymentStatus {
    pub state: Option<String>,
    pub created_at: Option<String>,
    pub log_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhPull {
    pub number: i64,
    pub merged_at: Option<String>,
    pub merge_commit_sha: Option<String>,
    pub user: Option<GhUser>,
}

#[derive(Debug, Deserialize)]
struct GhCompare {
    #[serde(default)]
    commits: Vec<GhCommit>,
}

#[derive(Debug, Deserialize)]
struct GhCommit {
    sha: Option<String>,
}

/// Build a deployment fact from its listing entry and status history.
///
/// `statuses` is newest first, as GitHub returns it. The status is the newest
/// state; `finished_at` is the oldest success, falling back to the newest
/// status time when the deployment never succeeded.
pub fn deployment_from_payload(
    raw: &GhDeployment,
    statuses: &[GhDeploymentStatus],
    environment: &str,
) -> Deployment {
    let latest = statuses.first();
    let first_success = statuses
        .iter()
        .rev()
        .find(|s| s.state.as_deref() == Some("success"))
        .and_then(|s| parse_opt_ts(s.created_at.as_deref()));
    let finished_at =
        first_success.or_else(|| latest.and_then(|s| parse_opt_ts(s.created_at.as_deref())));

    Deployment {
        id: raw.id,
        environment: environment.to_string(),
        created_at: parse_opt_ts(raw.created_at.as_deref()),
        finished_at,
        status: latest
            .and_then(|s| s.state.clone())
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        actor: raw.creator.as_ref().and_then(|c| c.login.clone()),
        commit_sha: raw.sha.clone().or_else(|| raw.git_ref.clone()),
        git_ref: raw.git_ref.clone(),
        log_url: latest.and_then(|s| s.log_url.clone()),
    }
}

/// Merged pulls only, newest merge first, capped at `limit` (0 = no cap).
pub fn merged_changes_from_pulls(pulls: Vec<GhPull>, limit: usize) -> Vec<MergedChange> {
    let mut merged: Vec<GhPull> = pulls
        .into_iter()
        .filter(|p| p.merged_at.as_deref().is_some_and(|m| !m.is_empty()))
        .collect();
    merged.sort_by(|a, b| b.merged_at.cmp(&a.merged_at));
    if limit > 0 {
        merged.truncate(limit);
    }
    merged
        .into_iter()
        .map(|p| MergedChange {
            number: p.number,
            merged_at: parse_opt_ts(p.merged_at.as_deref()),
            merge_commit_sha: p.merge_commit_sha,
            author: p.user.and_then(|u| u.login),
        })
        .collect()
}

pub struct GithubClient {
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    target: GithubTarget,
    page_cap: u32,
    deploy_limit: usize,
    pr_limit: usize,
}

impl GithubClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        retry: RetryConfig,
        target: GithubTarget,
    ) -> Self {
        Self {
            http,
            clock,
            retry,
            target,
            page_cap: 10,
            deploy_limit: 0,
            pr_limit: 0,
        }
    }

    /// Cap pages per listing and the number of ingested records (0 = no cap).
    pub fn with_limits(mut self, page_cap: u32, deploy_limit: usize, pr_limit: usize) -> Self {
        self.page_cap = page_cap;
        self.deploy_limit = deploy_limit;
        self.pr_limit = pr_limit;
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.target.api_base, self.target.owner, self.target.repo, path
        )
    }

    fn request(&self, url: String) -> HttpRequest {
        HttpRequest::get(url)
            .header("Authorization", format!("Bearer {}", self.target.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn get_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T> {
        get_with_backoff(self.http.as_ref(), self.clock.as_ref(), &self.retry, request)?.json()
    }

    /// Fetch up to `page_cap` pages of a listing, stopping at a short page.
    fn get_paged<T: DeserializeOwned>(&self, base: HttpRequest) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for page in 1..=self.page_cap {
            let request = base
                .clone()
                .set_query("per_page", PER_PAGE)
                .set_query("page", page);
            let batch: serde_json::Value = self.get_json(&request)?;
            let serde_json::Value::Array(items) = batch else {
                break;
            };
            let len = items.len();
            for item in items {
                out.push(serde_json::from_value(item)?);
            }
            if len < PER_PAGE {
                break;
            }
        }
        Ok(out)
    }

    fn fetch_statuses(&self, deployment_id: i64) -> Result<Vec<GhDeploymentStatus>> {
        let url = self.repo_url(&format!("deployments/{deployment_id}/statuses"));
        self.get_paged(self.request(url))
    }
}

impl ChangeSource for GithubClient {
    fn deployments(&self) -> Result<Vec<Deployment>> {
        let request = self
            .request(self.repo_url("deployments"))
            .query("environment", &self.target.environment);
        let mut listed: Vec<GhDeployment> = self.get_paged(request)?;
        if self.deploy_limit > 0 {
            listed.truncate(self.deploy_limit);
        }

        let mut deployments = Vec::with_capacity(listed.len());
        for raw in &listed {
            let statuses = self.fetch_statuses(raw.id)?;
            deployments.push(deployment_from_payload(
                raw,
                &statuses,
                &self.target.environment,
            ));
        }
        tracing::info!(count = deployments.len(), environment = %self.target.environment, "Fetched GitHub deployments");
        Ok(deployments)
    }

    fn merged_changes(&self) -> Result<Vec<MergedChange>> {
        let request = self.request(self.repo_url("pulls")).query("state", "closed");
        let pulls: Vec<GhPull> = self.get_paged(request)?;
        let changes = merged_changes_from_pulls(pulls, self.pr_limit);
        tracing::info!(count = changes.len(), "Fetched merged GitHub pull requests");
        Ok(changes)
    }
}

impl RangeOracle for GithubClient {
    fn members_between(&self, prev_sha: &str, curr_sha: &str) -> Result<BTreeSet<String>> {
        let url = self.repo_url(&format!("compare/{prev_sha}...{curr_sha}"));
        let compare: GhCompare = self.get_json(&self.request(url))?;
        Ok(compare.commits.into_iter().filter_map(|c| c.sha).collect())
    }
}
