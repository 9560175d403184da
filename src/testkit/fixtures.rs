use chrono::{DateTime, Utc};

use crate::core::time::parse_ts;
use crate::core::{Deployment, Incident, MergedChange};

/// Parse an RFC 3339 timestamp, panicking on malformed fixtures.
pub fn ts(value: &str) -> DateTime<Utc> {
    parse_ts(value).unwrap_or_else(|| panic!("bad fixture timestamp: {value}"))
}

/// Production deployment of `sha` with the given status.
pub fn deployment(id: i64, sha: &str, finished: Option<&str>, status: &str) -> Deployment {
    let finished_at = finished.map(ts);
    Deployment {
        id,
        environment: "production".to_string(),
        created_at: finished_at,
        finished_at,
        status: status.to_string(),
        actor: Some("deployer".to_string()),
        commit_sha: Some(sha.to_string()),
        git_ref: Some("main".to_string()),
        log_url: None,
    }
}

pub fn change(number: i64, merged: Option<&str>, sha: Option<&str>) -> MergedChange {
    MergedChange {
        number,
        merged_at: merged.map(ts),
        merge_commit_sha: sha.map(String::from),
        author: Some("dev".to_string()),
    }
}

pub fn incident(id: &str, created: &str, closed: &str) -> Incident {
    Incident::from_span(id, format!("incident {id}"), ts(created), ts(closed))
}
