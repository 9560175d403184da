use std::fs;
use std::path::{Path, PathBuf};

use super::core::DoraConfig;
use crate::errors::{DoraError, Result};

/// File name searched for in the working directory and its ancestors.
pub const CONFIG_FILE_NAME: &str = ".dora.toml";

const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Pure function to parse config from a TOML string
pub fn parse_config(contents: &str) -> Result<DoraConfig> {
    Ok(toml::from_str::<DoraConfig>(contents)?)
}

/// Load and parse a config file at an explicit path.
pub fn load_config_from_path(path: &Path) -> Result<DoraConfig> {
    let contents = fs::read_to_string(path).map_err(|e| {
        DoraError::config(format!("cannot read {}: {}", path.display(), e))
    })?;
    let config = parse_config(&contents)
        .map_err(|e| DoraError::config(format!("invalid {}: {}", path.display(), e)))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Pure function to generate directory ancestors up to a depth limit
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Find `.dora.toml` in `start` or one of its ancestors.
pub fn discover_config(start: PathBuf) -> Option<PathBuf> {
    directory_ancestors(start, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
}

/// Load the file layer of the configuration.
///
/// An explicit path must exist. Without one, the nearest discovered file is
/// used, falling back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<DoraConfig> {
    if let Some(path) = explicit {
        return load_config_from_path(path);
    }

    let current = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!("Failed to get current directory: {}. Using default config.", e);
            return Ok(DoraConfig::default());
        }
    };

    match discover_config(current) {
        Some(path) => load_config_from_path(&path),
        None => {
            tracing::debug!("No {} found. Using default config.", CONFIG_FILE_NAME);
            Ok(DoraConfig::default())
        }
    }
}

/// Overlay environment variables onto a config.
///
/// `lookup` is injected so callers (and tests) decide where values come from;
/// production passes `|k| std::env::var(k).ok()`. Empty values are ignored.
pub fn apply_env_overrides<F>(mut config: DoraConfig, lookup: F) -> Result<DoraConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GH_TOKEN") {
        config.github.token = Some(v);
    }
    if let Some(v) = get("OWNER") {
        config.github.owner = Some(v);
    }
    if let Some(v) = get("REPO") {
        config.github.repo = Some(v);
    }
    if let Some(v) = get("ENVIRONMENT") {
        config.github.environment = Some(v);
    }
    if let Some(v) = get("SENTRY_TOKEN") {
        config.sentry.token = Some(v);
    }
    if let Some(v) = get("SENTRY_ORG") {
        config.sentry.org = Some(v);
    }
    if let Some(v) = get("SENTRY_PROJECT") {
        config.sentry.project = Some(v);
    }
    if let Some(v) = get("SENTRY_PROJECT_NAME") {
        config.sentry.project_name = Some(v);
    }
    if let Some(v) = get("DAYS_LOOKBACK") {
        config.tunables.lookback_days = parse_number("DAYS_LOOKBACK", &v)?;
    }
    if let Some(v) = get("CFR_WINDOW_MINUTES") {
        config.tunables.cfr_window_minutes = parse_number("CFR_WINDOW_MINUTES", &v)?;
    }
    if let Some(v) = get("PR_LIMIT") {
        config.tunables.pr_limit = parse_number("PR_LIMIT", &v)?;
    }
    if let Some(v) = get("DEPLOY_LIMIT") {
        config.tunables.deploy_limit = parse_number("DEPLOY_LIMIT", &v)?;
    }
    if let Some(v) = get("DORA_DB_PATH") {
        config.storage.db_path = PathBuf::from(v);
    }

    Ok(config)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| DoraError::config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// Template written by `dora-metrics init`.
pub const CONFIG_TEMPLATE: &str = r#"# dora-metrics configuration
# Environment variables (GH_TOKEN, OWNER, REPO, ENVIRONMENT, SENTRY_*) override these values.

[github]
# token = "ghp_..."
owner = ""
repo = ""
environment = "production"

[sentry]
# token = ""
# org = ""
# project = ""
# project_name = ""
environment = "production"

[tunables]
lookback_days = 90
cfr_window_minutes = 120
pr_limit = 5000
deploy_limit = 5000
page_cap = 10

[storage]
db_path = "dora.sqlite"
export_path = "dora.json"

[retry]
max_retries = 6
base_delay_ms = 1500
strategy = "exponential"
multiplier = 1.8
max_delay_ms = 60000
max_rate_limit_wait_secs = 900
"#;
