//! Daily summary rollup and the unified event stream.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::time::utc_day;
use crate::core::{
    CfrRecord, DailySummary, Deployment, Event, EventKind, Incident, LeadTimeRecord, MergedChange,
};

/// Everything the daily rollup reads.
pub struct RollupInput {
    /// Deployments of the tracked environment.
    pub deployments: Vec<Deployment>,
    pub cfr: Vec<CfrRecord>,
    pub changes: Vec<MergedChange>,
    pub lead_times: Vec<LeadTimeRecord>,
    pub incidents: Vec<Incident>,
}

fn add<V: std::ops::AddAssign + Default>(map: &mut HashMap<NaiveDate, V>, day: NaiveDate, value: V) {
    *map.entry(day).or_default() += value;
}

/// Per-day summary over the union of days seen by any aggregation.
///
/// `avg_lead_time_hours` is the sum of the day's lead times, keyed by the
/// change's merge day.
pub fn daily_summaries(input: RollupInput) -> Vec<DailySummary> {
    let mut deploys: HashMap<NaiveDate, i64> = HashMap::new();
    let mut failed: HashMap<NaiveDate, i64> = HashMap::new();
    let mut lead_time: HashMap<NaiveDate, f64> = HashMap::new();
    let mut mttr: HashMap<NaiveDate, f64> = HashMap::new();

    let failed_by_id: HashMap<i64, bool> =
        input.cfr.iter().map(|r| (r.deployment_id, r.failed)).collect();
    for deployment in &input.deployments {
        let Some(finished_at) = deployment.finished_at else {
            continue;
        };
        let day = utc_day(&finished_at);
        add(&mut deploys, day, 1);
        if let Some(was_failed) = failed_by_id.get(&deployment.id) {
            add(&mut failed, day, i64::from(*was_failed));
        }
    }

    let merged_day: HashMap<i64, NaiveDate> = input
        .changes
        .iter()
        .filter_map(|c| c.merged_at.map(|at| (c.number, utc_day(&at))))
        .collect();
    for record in &input.lead_times {
        if let Some(day) = merged_day.get(&record.change_number) {
            add(&mut lead_time, *day, record.lead_time_hours);
        }
    }

    for incident in &input.incidents {
        add(&mut mttr, utc_day(&incident.created_at), incident.duration_minutes);
    }

    let days: BTreeSet<NaiveDate> = deploys
        .keys()
        .chain(failed.keys())
        .chain(lead_time.keys())
        .chain(mttr.keys())
        .copied()
        .collect();

    days.into_iter()
        .map(|date| {
            let deploy_count = deploys.get(&date).copied().unwrap_or(0);
            let failed_deploy_count = failed.get(&date).copied().unwrap_or(0);
            let change_failure_rate = if deploy_count > 0 {
                failed_deploy_count as f64 / deploy_count as f64
            } else {
                0.0
            };
            DailySummary {
                date,
                deploy_count,
                failed_deploy_count,
                change_failure_rate,
                avg_lead_time_hours: lead_time.get(&date).copied().unwrap_or(0.0),
                mttr_minutes: mttr.get(&date).copied().unwrap_or(0.0),
            }
        })
        .collect()
}

/// Everything the event stream reads.
pub struct EventInput {
    /// Deployments of every environment.
    pub deployments: Vec<Deployment>,
    pub changes: Vec<MergedChange>,
    pub incidents: Vec<Incident>,
}

/// Flatten facts into one time-ordered stream numbered from 1.
///
/// Ordering is by time (missing times first), then kind, then natural key,
/// so repeated runs over the same facts number events identically.
pub fn event_stream(input: EventInput) -> Vec<Event> {
    let blank = |kind: EventKind| Event {
        event_id: 0,
        kind,
        when: None,
        sha: None,
        change_number: None,
        deployment_id: None,
        incident_id: None,
        title: None,
        status: None,
    };

    let mut keyed: Vec<((i64, String), Event)> = Vec::new();
    for d in input.deployments.into_iter().filter(|d| d.finished_at.is_some()) {
        let event = Event {
            when: d.finished_at,
            sha: d.commit_sha,
            deployment_id: Some(d.id),
            status: Some(d.status),
            ..blank(EventKind::Deployment)
        };
        keyed.push(((d.id, String::new()), event));
    }
    for c in input.changes {
        let event = Event {
            when: c.merged_at,
            sha: c.merge_commit_sha,
            change_number: Some(c.number),
            ..blank(EventKind::ChangeMerge)
        };
        keyed.push(((c.number, String::new()), event));
    }
    for i in input.incidents {
        let event = Event {
            when: Some(i.created_at),
            incident_id: Some(i.id.clone()),
            title: Some(i.title),
            ..blank(EventKind::Incident)
        };
        keyed.push(((0, i.id), event));
    }

    keyed.sort_by(|(ka, a), (kb, b)| a.when.cmp(&b.when).then(a.kind.cmp(&b.kind)).then(ka.cmp(kb)));
    keyed
        .into_iter()
        .enumerate()
        .map(|(n, (_, mut event))| {
            event.event_id = n as i64 + 1;
            event
        })
        .collect()
}

/// Count of events per kind, for logging.
pub fn event_counts(events: &[Event]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.kind.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CfrReason;
    use crate::testkit::{change, deployment, incident, ts};
    use pretty_assertions::assert_eq;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn lead(number: i64, hours: f64) -> LeadTimeRecord {
        LeadTimeRecord {
            change_number: number,
            first_deployed_at: Some(ts("2024-01-05T00:00:00Z")),
            lead_time_hours: hours,
            window_prev_sha: Some("a".into()),
            window_curr_sha: Some("b".into()),
        }
    }

    fn empty() -> RollupInput {
        RollupInput {
            deployments: Vec::new(),
            cfr: Vec::new(),
            changes: Vec::new(),
            lead_times: Vec::new(),
            incidents: Vec::new(),
        }
    }

    #[test]
    fn test_deploys_and_failures_per_day() {
        let input = RollupInput {
            deployments: vec![
                deployment(1, "a", Some("2024-01-01T01:00:00Z"), "success"),
                deployment(2, "b", Some("2024-01-01T23:59:59Z"), "failure"),
                deployment(3, "c", None, "pending"),
            ],
            cfr: vec![
                CfrRecord::healthy(1),
                CfrRecord::failed(2, CfrReason::GhStatusFailure),
            ],
            ..empty()
        };
        let rows = daily_summaries(input);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, day("2024-01-01"));
        assert_eq!(rows[0].deploy_count, 2);
        assert_eq!(rows[0].failed_deploy_count, 1);
        assert_eq!(rows[0].change_failure_rate, 0.5);
    }

    #[test]
    fn test_day_without_deploys_has_zero_cfr() {
        let input = RollupInput {
            incidents: vec![incident("1", "2024-01-03T10:00:00Z", "2024-01-03T10:45:00Z")],
            ..empty()
        };
        let rows = daily_summaries(input);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].deploy_count, 0);
        assert_eq!(rows[0].change_failure_rate, 0.0);
        assert_eq!(rows[0].mttr_minutes, 45.0);
    }

    #[test]
    fn test_daily_lead_time_is_a_sum_not_a_mean() {
        let input = RollupInput {
            changes: vec![
                change(1, Some("2024-01-02T08:00:00Z"), Some("x")),
                change(2, Some("2024-01-02T09:00:00Z"), Some("y")),
            ],
            lead_times: vec![lead(1, 10.0), lead(2, 20.0)],
            ..empty()
        };
        let rows = daily_summaries(input);
        assert_eq!(rows[0].avg_lead_time_hours, 30.0);
    }

    #[test]
    fn test_days_are_union_of_all_sources_sorted() {
        let input = RollupInput {
            deployments: vec![deployment(1, "a", Some("2024-01-03T00:00:00Z"), "success")],
            cfr: vec![CfrRecord::healthy(1)],
            changes: vec![change(5, Some("2024-01-01T00:00:00Z"), Some("x"))],
            lead_times: vec![LeadTimeRecord::unattributed(5)],
            incidents: vec![incident("9", "2024-01-02T00:00:00Z", "2024-01-02T00:10:00Z")],
        };
        let dates: Vec<NaiveDate> = daily_summaries(input).iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day("2024-01-01"), day("2024-01-02"), day("2024-01-03")]);
    }

    #[test]
    fn test_event_stream_order_and_numbering() {
        let input = EventInput {
            deployments: vec![
                deployment(2, "b", Some("2024-01-02T00:00:00Z"), "success"),
                deployment(1, "a", None, "pending"),
            ],
            changes: vec![
                change(7, Some("2024-01-01T00:00:00Z"), Some("c")),
                change(8, None, None),
            ],
            incidents: vec![incident("i1", "2024-01-02T00:00:00Z", "2024-01-02T01:00:00Z")],
        };
        let events = event_stream(input);
        let summary: Vec<(i64, EventKind)> = events.iter().map(|e| (e.event_id, e.kind)).collect();
        assert_eq!(
            summary,
            vec![
                (1, EventKind::ChangeMerge),
                (2, EventKind::ChangeMerge),
                (3, EventKind::Deployment),
                (4, EventKind::Incident),
            ]
        );
        assert_eq!(events[0].change_number, Some(8));
        assert_eq!(events[2].status.as_deref(), Some("success"));
        assert_eq!(events[3].title.as_deref(), Some("incident i1"));
        assert_eq!(event_counts(&events)["change_merge"], 2);
    }
}
