//! SQL schema for the fact and derived tables.

/// Fact tables, upserted by natural key during ingestion.
pub const FACT_TABLES: &[&str] = &["fact_deployment", "fact_change", "fact_incident"];

/// Derived tables, replaced wholesale by each derivation stage.
pub const DERIVED_TABLES: &[&str] = &[
    "derived_deploy_window",
    "derived_change_lead_time",
    "derived_cfr_per_deploy",
    "dora_summary_daily",
    "dora_events",
];

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS fact_deployment (
    deployment_id         INTEGER PRIMARY KEY,
    environment           TEXT NOT NULL,
    created_at_utc        TEXT,
    finished_at_utc       TEXT,
    state                 TEXT NOT NULL,
    actor                 TEXT,
    sha                   TEXT,
    ref                   TEXT,
    log_url               TEXT,
    source_fetched_at_utc TEXT,
    etl_run_id            TEXT
);
CREATE INDEX IF NOT EXISTS idx_fact_deployment_time ON fact_deployment(finished_at_utc);

CREATE TABLE IF NOT EXISTS fact_change (
    change_number         INTEGER PRIMARY KEY,
    merged_at_utc         TEXT,
    merge_sha             TEXT,
    author                TEXT,
    source_fetched_at_utc TEXT,
    etl_run_id            TEXT
);
CREATE INDEX IF NOT EXISTS idx_fact_change_merged_time ON fact_change(merged_at_utc);
CREATE INDEX IF NOT EXISTS idx_fact_change_sha ON fact_change(merge_sha);

CREATE TABLE IF NOT EXISTS fact_incident (
    incident_id           TEXT PRIMARY KEY,
    title                 TEXT NOT NULL,
    created_utc           TEXT NOT NULL,
    closed_utc            TEXT NOT NULL,
    duration_minutes      REAL NOT NULL,
    source_fetched_at_utc TEXT,
    etl_run_id            TEXT
);
CREATE INDEX IF NOT EXISTS idx_fact_incident_time ON fact_incident(created_utc);

CREATE TABLE IF NOT EXISTS derived_deploy_window (
    window_id             INTEGER PRIMARY KEY,
    prev_sha              TEXT NOT NULL,
    curr_sha              TEXT NOT NULL,
    deployed_at_utc       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deploy_window_time ON derived_deploy_window(deployed_at_utc);

CREATE TABLE IF NOT EXISTS derived_change_lead_time (
    change_number         INTEGER PRIMARY KEY,
    first_deployed_at_utc TEXT,
    lt_hours              REAL NOT NULL,
    window_prev_sha       TEXT,
    window_curr_sha       TEXT
);

CREATE TABLE IF NOT EXISTS derived_cfr_per_deploy (
    deployment_id         INTEGER PRIMARY KEY,
    failed                INTEGER NOT NULL,
    reason                TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dora_summary_daily (
    date                  TEXT PRIMARY KEY,
    deploys               INTEGER NOT NULL,
    failed_deploys        INTEGER NOT NULL,
    cfr                   REAL NOT NULL,
    avg_lt_hours          REAL NOT NULL,
    mttr_min              REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS dora_events (
    event_id              INTEGER PRIMARY KEY,
    event_type            TEXT NOT NULL,
    when_utc              TEXT,
    sha                   TEXT,
    change_number         INTEGER,
    deployment_id         INTEGER,
    incident_id           TEXT,
    title                 TEXT,
    state                 TEXT
);
"#;
