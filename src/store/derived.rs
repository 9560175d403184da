use chrono::NaiveDate;
use rusqlite::{params, Transaction};

use super::DoraStore;
use crate::core::time::{format_opt_ts, format_ts, parse_opt_ts, parse_ts};
use crate::core::{
    CfrReason, CfrRecord, DailySummary, DeployWindow, Event, EventKind, LeadTimeRecord,
};
use crate::errors::{DoraError, Result};

fn clear(tx: &Transaction<'_>, table: &str) -> Result<()> {
    tx.execute(&format!("DELETE FROM {table}"), [])?;
    Ok(())
}

impl DoraStore {
    /// Clear the window and lead-time tables together.
    pub fn clear_windows_and_lead_times(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear(&tx, "derived_deploy_window")?;
        clear(&tx, "derived_change_lead_time")?;
        tx.commit()?;
        Ok(())
    }

    pub fn replace_windows(&mut self, windows: &[DeployWindow]) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear(&tx, "derived_deploy_window")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO derived_deploy_window (window_id, prev_sha, curr_sha, deployed_at_utc)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for w in windows {
                stmt.execute(params![
                    w.window_id,
                    w.prev_sha,
                    w.curr_sha,
                    format_ts(&w.deployed_at)
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn replace_lead_times(&mut self, records: &[LeadTimeRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear(&tx, "derived_change_lead_time")?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO derived_change_lead_time
                 (change_number, first_deployed_at_utc, lt_hours, window_prev_sha, window_curr_sha)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.change_number,
                    format_opt_ts(r.first_deployed_at.as_ref()),
                    r.lead_time_hours,
                    r.window_prev_sha,
                    r.window_curr_sha,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn replace_cfr(&mut self, records: &[CfrRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear(&tx, "derived_cfr_per_deploy")?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO derived_cfr_per_deploy (deployment_id, failed, reason)
                 VALUES (?1, ?2, ?3)",
            )?;
            for r in records {
                stmt.execute(params![r.deployment_id, r.failed, r.reason.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn replace_summaries(&mut self, rows: &[DailySummary]) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear(&tx, "dora_summary_daily")?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO dora_summary_daily
                 (date, deploys, failed_deploys, cfr, avg_lt_hours, mttr_min)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in rows {
                stmt.execute(params![
                    s.date.format("%Y-%m-%d").to_string(),
                    s.deploy_count,
                    s.failed_deploy_count,
                    s.change_failure_rate,
                    s.avg_lead_time_hours,
                    s.mttr_minutes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn replace_events(&mut self, events: &[Event]) -> Result<()> {
        let tx = self.conn.transaction()?;
        clear(&tx, "dora_events")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dora_events
                 (event_id, event_type, when_utc, sha, change_number, deployment_id,
                  incident_id, title, state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for e in events {
                stmt.execute(params![
                    e.event_id,
                    e.kind.as_str(),
                    format_opt_ts(e.when.as_ref()),
                    e.sha,
                    e.change_number,
                    e.deployment_id,
                    e.incident_id,
                    e.title,
                    e.status,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Windows ordered by deploy time (ties by id).
    pub fn load_windows(&self) -> Result<Vec<DeployWindow>> {
        let mut stmt = self.conn.prepare(
            "SELECT window_id, prev_sha, curr_sha, deployed_at_utc
             FROM derived_deploy_window ORDER BY deployed_at_utc, window_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut windows = Vec::new();
        for row in rows {
            let (window_id, prev_sha, curr_sha, deployed) = row?;
            let deployed_at = parse_ts(&deployed)
                .ok_or_else(|| DoraError::decode(format!("window {window_id}: bad time {deployed}")))?;
            windows.push(DeployWindow {
                window_id,
                prev_sha,
                curr_sha,
                deployed_at,
            });
        }
        Ok(windows)
    }

    pub fn load_lead_times(&self) -> Result<Vec<LeadTimeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT change_number, first_deployed_at_utc, lt_hours, window_prev_sha, window_curr_sha
             FROM derived_change_lead_time ORDER BY change_number",
        )?;
        let rows = stmt.query_map([], |row| {
            let first: Option<String> = row.get(1)?;
            Ok(LeadTimeRecord {
                change_number: row.get(0)?,
                first_deployed_at: parse_opt_ts(first.as_deref()),
                lead_time_hours: row.get(2)?,
                window_prev_sha: row.get(3)?,
                window_curr_sha: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn load_cfr(&self) -> Result<Vec<CfrRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT deployment_id, failed, reason FROM derived_cfr_per_deploy
             ORDER BY deployment_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (deployment_id, failed, reason) = row?;
            let reason = reason.parse::<CfrReason>().map_err(DoraError::decode)?;
            records.push(CfrRecord {
                deployment_id,
                failed,
                reason,
            });
        }
        Ok(records)
    }

    pub fn load_summaries(&self) -> Result<Vec<DailySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, deploys, failed_deploys, cfr, avg_lt_hours, mttr_min
             FROM dora_summary_daily ORDER BY date",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            let (date, deploys, failed, cfr, lt, mttr) = row?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| DoraError::decode(format!("summary date {date}: {e}")))?;
            summaries.push(DailySummary {
                date,
                deploy_count: deploys,
                failed_deploy_count: failed,
                change_failure_rate: cfr,
                avg_lead_time_hours: lt,
                mttr_minutes: mttr,
            });
        }
        Ok(summaries)
    }

    pub fn load_events(&self) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, event_type, when_utc, sha, change_number, deployment_id,
                    incident_id, title, state
             FROM dora_events ORDER BY event_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                Event {
                    event_id: 0,
                    kind: EventKind::Deployment,
                    when: None,
                    sha: row.get(3)?,
                    change_number: row.get(4)?,
                    deployment_id: row.get(5)?,
                    incident_id: row.get(6)?,
                    title: row.get(7)?,
                    status: row.get(8)?,
                },
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (event_id, kind, when, mut event) = row?;
            event.event_id = event_id;
            event.kind = kind.parse::<EventKind>().map_err(DoraError::decode)?;
            event.when = parse_opt_ts(when.as_deref());
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ts;

    fn window(id: i64, prev: &str, curr: &str, at: &str) -> DeployWindow {
        DeployWindow {
            window_id: id,
            prev_sha: prev.into(),
            curr_sha: curr.into(),
            deployed_at: ts(at),
        }
    }

    #[test]
    fn test_replace_windows_discards_previous_contents() {
        let mut store = DoraStore::open_in_memory().unwrap();
        store
            .replace_windows(&[
                window(1, "a", "b", "2024-01-02T00:00:00Z"),
                window(2, "b", "c", "2024-01-03T00:00:00Z"),
            ])
            .unwrap();
        store
            .replace_windows(&[window(1, "x", "y", "2024-02-01T00:00:00Z")])
            .unwrap();
        let windows = store.load_windows().unwrap();
        assert_eq!(windows, vec![window(1, "x", "y", "2024-02-01T00:00:00Z")]);
    }

    #[test]
    fn test_clear_windows_and_lead_times() {
        let mut store = DoraStore::open_in_memory().unwrap();
        store
            .replace_windows(&[window(1, "a", "b", "2024-01-02T00:00:00Z")])
            .unwrap();
        store
            .replace_lead_times(&[LeadTimeRecord::unattributed(9)])
            .unwrap();
        store.clear_windows_and_lead_times().unwrap();
        assert!(store.load_windows().unwrap().is_empty());
        assert!(store.load_lead_times().unwrap().is_empty());
    }

    #[test]
    fn test_cfr_round_trip() {
        let mut store = DoraStore::open_in_memory().unwrap();
        let records = vec![
            CfrRecord::healthy(1),
            CfrRecord::failed(2, CfrReason::GhStatusFailure),
        ];
        store.replace_cfr(&records).unwrap();
        assert_eq!(store.load_cfr().unwrap(), records);
    }

    #[test]
    fn test_events_round_trip() {
        let mut store = DoraStore::open_in_memory().unwrap();
        let events = vec![Event {
            event_id: 1,
            kind: EventKind::Incident,
            when: Some(ts("2024-01-01T00:00:00Z")),
            sha: None,
            change_number: None,
            deployment_id: None,
            incident_id: Some("77".into()),
            title: Some("boom".into()),
            status: None,
        }];
        store.replace_events(&events).unwrap();
        assert_eq!(store.load_events().unwrap(), events);
    }
}
