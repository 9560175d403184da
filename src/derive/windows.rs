//! Deployment windows: commit ranges between consecutive finished deployments.

use crate::core::{DeployWindow, Deployment};

/// Deployments that can bound a window, ordered by completion time.
///
/// A deployment qualifies when it has finished and carries a commit sha.
/// Ties on `finished_at` are broken by deployment id.
pub fn qualifying_deployments(deployments: &[Deployment]) -> Vec<&Deployment> {
    let mut qualifying: Vec<&Deployment> = deployments
        .iter()
        .filter(|d| d.finished_at.is_some())
        .filter(|d| {
            let has_sha = d.commit_sha.as_deref().is_some_and(|s| !s.is_empty());
            if !has_sha {
                tracing::warn!(deployment = d.id, "Finished deployment has no commit sha; excluded from windows");
            }
            has_sha
        })
        .collect();
    qualifying.sort_by(|a, b| a.finished_at.cmp(&b.finished_at).then(a.id.cmp(&b.id)));
    qualifying
}

/// Build `n - 1` windows from `n` qualifying deployments.
///
/// Window `i` spans the sha of deployment `i` to the sha of deployment
/// `i + 1` and is stamped with the later deployment's completion time.
/// Fewer than two qualifying deployments yield no windows.
pub fn build_windows(deployments: Vec<Deployment>) -> Vec<DeployWindow> {
    let ordered = qualifying_deployments(&deployments);
    ordered
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let (prev, curr) = (pair[0], pair[1]);
            Some(DeployWindow {
                window_id: i as i64 + 1,
                prev_sha: prev.commit_sha.clone()?,
                curr_sha: curr.commit_sha.clone()?,
                deployed_at: curr.finished_at?,
            })
        })
        .collect()
}
