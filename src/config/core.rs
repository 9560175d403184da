use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::retry::RetryConfig;
use crate::errors::{DoraError, Result};

/// Root configuration structure for dora-metrics
///
/// Built once at process start (file, then environment, then CLI flags) and
/// passed by reference into every stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoraConfig {
    /// Source-control host settings
    #[serde(default)]
    pub github: GithubConfig,

    /// Error-tracker settings (optional integration)
    #[serde(default)]
    pub sentry: SentryConfig,

    /// Lookback, observation window and result caps
    #[serde(default)]
    pub tunables: TunablesConfig,

    /// Store and export locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    /// Deployment environment this run is scoped to
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default = "default_github_api")]
    pub api_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            environment: None,
            api_base: default_github_api(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentryConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    /// Project slug used to scope issue searches
    #[serde(default)]
    pub project: Option<String>,
    /// Project display name incidents are filtered on; defaults to the slug
    #[serde(default)]
    pub project_name: Option<String>,
    /// Error-tracker environment whose release deploys are considered
    #[serde(default = "default_sentry_environment")]
    pub environment: String,
    #[serde(default = "default_sentry_api")]
    pub api_base: String,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            token: None,
            org: None,
            project: None,
            project_name: None,
            environment: default_sentry_environment(),
            api_base: default_sentry_api(),
        }
    }
}

impl SentryConfig {
    /// Token, organization and project are all present.
    pub fn is_configured(&self) -> bool {
        [&self.token, &self.org, &self.project]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// Name incidents must carry to be ingested.
    pub fn effective_project_name(&self) -> Option<&str> {
        self.project_name.as_deref().or(self.project.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunablesConfig {
    /// How far back release deploys are considered (default: 90)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Observation window after a deployment, in minutes (default: 120)
    #[serde(default = "default_cfr_window_minutes")]
    pub cfr_window_minutes: u32,
    /// Cap on ingested pull requests; 0 disables the cap (default: 5000)
    #[serde(default = "default_limit")]
    pub pr_limit: usize,
    /// Cap on ingested deployments; 0 disables the cap (default: 5000)
    #[serde(default = "default_limit")]
    pub deploy_limit: usize,
    /// Maximum pages fetched per listing (default: 10)
    #[serde(default = "default_page_cap")]
    pub page_cap: u32,
}

impl Default for TunablesConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            cfr_window_minutes: default_cfr_window_minutes(),
            pr_limit: default_limit(),
            deploy_limit: default_limit(),
            page_cap: default_page_cap(),
        }
    }
}

impl TunablesConfig {
    pub fn cfr_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cfr_window_minutes))
    }

    /// Start of the lookback period ending at `now`.
    ///
    /// Errors when `lookback_days` reaches past the representable time range.
    pub fn lookback_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        chrono::Duration::try_days(i64::from(self.lookback_days))
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .ok_or_else(|| {
                DoraError::config(format!(
                    "DAYS_LOOKBACK of {} days is out of range",
                    self.lookback_days
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            export_path: default_export_path(),
        }
    }
}

/// The validated GitHub coordinates a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubTarget {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub environment: String,
    pub api_base: String,
}

impl DoraConfig {
    /// Resolve the required GitHub settings, naming every missing one.
    pub fn github_target(&self) -> Result<GithubTarget> {
        let gh = &self.github;
        let required = [
            ("GH_TOKEN", &gh.token),
            ("OWNER", &gh.owner),
            ("REPO", &gh.repo),
            ("ENVIRONMENT", &gh.environment),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(DoraError::missing_config(missing));
        }

        Ok(GithubTarget {
            token: gh.token.clone().unwrap_or_default(),
            owner: gh.owner.clone().unwrap_or_default(),
            repo: gh.repo.clone().unwrap_or_default(),
            environment: gh.environment.clone().unwrap_or_default(),
            api_base: gh.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Environment name, required even for store-only commands.
    pub fn environment(&self) -> Result<&str> {
        self.github
            .environment
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DoraError::missing_config(["ENVIRONMENT"]))
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_sentry_api() -> String {
    "https://sentry.io/api/0".to_string()
}

fn default_sentry_environment() -> String {
    "production".to_string()
}

fn default_lookback_days() -> u32 {
    90
}

fn default_cfr_window_minutes() -> u32 {
    120
}

fn default_limit() -> usize {
    5000
}

fn default_page_cap() -> u32 {
    10
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dora.sqlite")
}

fn default_export_path() -> PathBuf {
    PathBuf::from("dora.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> DoraConfig {
        let mut config = DoraConfig::default();
        config.github.token = Some("t".into());
        config.github.owner = Some("acme".into());
        config.github.repo = Some("api".into());
        config.github.environment = Some("production".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = DoraConfig::default();
        assert_eq!(config.tunables.cfr_window_minutes, 120);
        assert_eq!(config.tunables.lookback_days, 90);
        assert_eq!(config.storage.db_path, PathBuf::from("dora.sqlite"));
        assert_eq!(config.sentry.environment, "production");
    }

    #[test]
    fn test_lookback_start_subtracts_days() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 4, 1, 0, 0, 0).unwrap();
        let start = TunablesConfig::default().lookback_start(now).unwrap();
        assert_eq!((now - start).num_days(), 90);
    }

    #[test]
    fn test_huge_lookback_is_a_config_error() {
        let tunables = TunablesConfig {
            lookback_days: 200_000_000,
            ..TunablesConfig::default()
        };
        let err = tunables.lookback_start(Utc::now()).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("DAYS_LOOKBACK"));
    }

    #[test]
    fn test_github_target_reports_all_missing() {
        let err = DoraConfig::default().github_target().unwrap_err();
        let message = err.to_string();
        for name in ["GH_TOKEN", "OWNER", "REPO", "ENVIRONMENT"] {
            assert!(message.contains(name), "{message}");
        }
        assert!(err.is_config());
    }

    #[test]
    fn test_github_target_treats_empty_as_missing() {
        let mut config = complete();
        config.github.repo = Some(String::new());
        let err = config.github_target().unwrap_err();
        assert!(err.to_string().contains("REPO"));
    }

    #[test]
    fn test_github_target_trims_api_base() {
        let mut config = complete();
        config.github.api_base = "http://localhost:9000/".into();
        let target = config.github_target().unwrap();
        assert_eq!(target.api_base, "http://localhost:9000");
        assert_eq!(target.environment, "production");
    }

    #[test]
    fn test_sentry_configured_requires_all_three() {
        let mut sentry = SentryConfig {
            token: Some("s".into()),
            org: Some("acme".into()),
            ..Default::default()
        };
        assert!(!sentry.is_configured());
        sentry.project = Some("backend".into());
        assert!(sentry.is_configured());
        assert_eq!(sentry.effective_project_name(), Some("backend"));
    }
}
