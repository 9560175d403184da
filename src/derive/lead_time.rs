//! Change-to-window mapping and lead time.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use crate::core::time::hours_between;
use crate::core::{DeployWindow, LeadTimeRecord, MergedChange};
use crate::observability::{increment_processed, set_current_record, set_progress};
use crate::pipeline::Stage;
use crate::sources::RangeOracle;

pub struct LeadTimeInput {
    pub windows: Vec<DeployWindow>,
    pub changes: Vec<MergedChange>,
}

/// Range membership per window, queried at most once per run.
///
/// Oracle failures are cached as an empty range so a failing compare is not
/// retried for every change.
pub struct MembershipCache<'a> {
    oracle: &'a dyn RangeOracle,
    ranges: RefCell<HashMap<i64, BTreeSet<String>>>,
}

impl<'a> MembershipCache<'a> {
    pub fn new(oracle: &'a dyn RangeOracle) -> Self {
        Self {
            oracle,
            ranges: RefCell::new(HashMap::new()),
        }
    }

    pub fn contains(&self, window: &DeployWindow, sha: &str) -> bool {
        if let Some(members) = self.ranges.borrow().get(&window.window_id) {
            return members.contains(sha);
        }
        let members = match self
            .oracle
            .members_between(&window.prev_sha, &window.curr_sha)
        {
            Ok(members) => members,
            Err(err) => {
                tracing::warn!(
                    prev = %window.prev_sha,
                    curr = %window.curr_sha,
                    "Commit range lookup failed; treating window as empty: {}",
                    err
                );
                BTreeSet::new()
            }
        };
        let hit = members.contains(sha);
        self.ranges.borrow_mut().insert(window.window_id, members);
        hit
    }
}

/// Attribute one change to the first window whose range holds its merge
/// commit. `None` when the change lacks a merge commit or merge time.
pub fn attribute_change(
    change: &MergedChange,
    windows: &[DeployWindow],
    cache: &MembershipCache<'_>,
) -> Option<LeadTimeRecord> {
    let sha = change.merge_commit_sha.as_deref().filter(|s| !s.is_empty())?;
    let merged_at = change.merged_at?;

    let record = windows
        .iter()
        .find(|w| cache.contains(w, sha))
        .map(|w| LeadTimeRecord {
            change_number: change.number,
            first_deployed_at: Some(w.deployed_at),
            lead_time_hours: hours_between(&merged_at, &w.deployed_at),
            window_prev_sha: Some(w.prev_sha.clone()),
            window_curr_sha: Some(w.curr_sha.clone()),
        })
        .unwrap_or_else(|| LeadTimeRecord::unattributed(change.number));
    Some(record)
}

/// Maps merged changes onto windows through a [`RangeOracle`].
pub struct LeadTimeMapper<'a> {
    oracle: &'a dyn RangeOracle,
}

impl<'a> LeadTimeMapper<'a> {
    pub fn new(oracle: &'a dyn RangeOracle) -> Self {
        Self { oracle }
    }
}

impl Stage for LeadTimeMapper<'_> {
    type Input = LeadTimeInput;
    type Output = Vec<LeadTimeRecord>;
    type Error = std::convert::Infallible;

    fn execute(&self, input: LeadTimeInput) -> Result<Self::Output, Self::Error> {
        let LeadTimeInput {
            mut windows,
            mut changes,
        } = input;
        windows.sort_by(|a, b| {
            a.deployed_at
                .cmp(&b.deployed_at)
                .then(a.window_id.cmp(&b.window_id))
        });
        changes.sort_by_key(|c| c.number);

        let cache = MembershipCache::new(self.oracle);
        set_progress(0, changes.len());
        let mut records = Vec::with_capacity(changes.len());
        for change in &changes {
            let _record = set_current_record(format!("change {}", change.number));
            increment_processed();
            match attribute_change(change, &windows, &cache) {
                Some(record) => records.push(record),
                None => tracing::debug!(
                    change = change.number,
                    "Skipping change without merge commit or merge time"
                ),
            }
        }

        let attributed = records.iter().filter(|r| r.is_attributed()).count();
        tracing::info!(
            windows = windows.len(),
            records = records.len(),
            attributed,
            "Mapped merged changes to deployment windows"
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        "map lead times"
    }
}
