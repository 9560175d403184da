use chrono::{DateTime, Utc};
use rusqlite::params;

use super::DoraStore;
use crate::core::time::{format_opt_ts, format_ts, parse_opt_ts, parse_ts};
use crate::core::{Deployment, Incident, MergedChange};
use crate::errors::Result;

/// Provenance stamped on every fact row written by one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRun {
    pub run_id: String,
    pub fetched_at: DateTime<Utc>,
}

impl IngestRun {
    pub fn starting_at(fetched_at: DateTime<Utc>) -> Self {
        Self {
            run_id: format!("run-{}", fetched_at.timestamp()),
            fetched_at,
        }
    }
}

impl DoraStore {
    pub fn upsert_deployments(&mut self, deployments: &[Deployment], run: &IngestRun) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO fact_deployment
                 (deployment_id, environment, created_at_utc, finished_at_utc, state, actor,
                  sha, ref, log_url, source_fetched_at_utc, etl_run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for d in deployments {
                stmt.execute(params![
                    d.id,
                    d.environment,
                    format_opt_ts(d.created_at.as_ref()),
                    format_opt_ts(d.finished_at.as_ref()),
                    d.status,
                    d.actor,
                    d.commit_sha,
                    d.git_ref,
                    d.log_url,
                    format_ts(&run.fetched_at),
                    run.run_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(deployments.len())
    }

    pub fn upsert_changes(&mut self, changes: &[MergedChange], run: &IngestRun) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO fact_change
                 (change_number, merged_at_utc, merge_sha, author, source_fetched_at_utc, etl_run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for c in changes {
                stmt.execute(params![
                    c.number,
                    format_opt_ts(c.merged_at.as_ref()),
                    c.merge_commit_sha,
                    c.author,
                    format_ts(&run.fetched_at),
                    run.run_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(changes.len())
    }

    pub fn upsert_incidents(&mut self, incidents: &[Incident], run: &IngestRun) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO fact_incident
                 (incident_id, title, created_utc, closed_utc, duration_minutes,
                  source_fetched_at_utc, etl_run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for i in incidents {
                stmt.execute(params![
                    i.id,
                    i.title,
                    format_ts(&i.created_at),
                    format_ts(&i.closed_at),
                    i.duration_minutes,
                    format_ts(&run.fetched_at),
                    run.run_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(incidents.len())
    }

    /// Every deployment, optionally scoped to one environment, ordered by id.
    pub fn load_deployments(&self, environment: Option<&str>) -> Result<Vec<Deployment>> {
        let mut stmt = self.conn.prepare(
            "SELECT deployment_id, environment, created_at_utc, finished_at_utc, state, actor,
                    sha, ref, log_url
             FROM fact_deployment
             WHERE ?1 IS NULL OR environment = ?1
             ORDER BY deployment_id",
        )?;
        let rows = stmt.query_map(params![environment], |row| {
            let created: Option<String> = row.get(2)?;
            let finished: Option<String> = row.get(3)?;
            Ok(Deployment {
                id: row.get(0)?,
                environment: row.get(1)?,
                created_at: parse_opt_ts(created.as_deref()),
                finished_at: parse_opt_ts(finished.as_deref()),
                status: row.get(4)?,
                actor: row.get(5)?,
                commit_sha: row.get(6)?,
                git_ref: row.get(7)?,
                log_url: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every merged change, ordered by number.
    pub fn load_changes(&self) -> Result<Vec<MergedChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT change_number, merged_at_utc, merge_sha, author
             FROM fact_change ORDER BY change_number",
        )?;
        let rows = stmt.query_map([], |row| {
            let merged: Option<String> = row.get(1)?;
            Ok(MergedChange {
                number: row.get(0)?,
                merged_at: parse_opt_ts(merged.as_deref()),
                merge_commit_sha: row.get(2)?,
                author: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every incident with readable timestamps, ordered by id.
    pub fn load_incidents(&self) -> Result<Vec<Incident>> {
        let mut stmt = self.conn.prepare(
            "SELECT incident_id, title, created_utc, closed_utc, duration_minutes
             FROM fact_incident ORDER BY incident_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;

        let mut incidents = Vec::new();
        for row in rows {
            let (id, title, created, closed, duration_minutes) = row?;
            match (parse_ts(&created), parse_ts(&closed)) {
                (Some(created_at), Some(closed_at)) => incidents.push(Incident {
                    id,
                    title,
                    created_at,
                    closed_at,
                    duration_minutes,
                }),
                _ => tracing::warn!(incident = %id, "Skipping incident with unreadable timestamps"),
            }
        }
        Ok(incidents)
    }
}
