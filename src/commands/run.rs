//! The `run`, `derive`, `export` and `summary` commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{apply_env_overrides, load_config, DoraConfig};
use crate::derive::{run_derivation, DerivationContext, DerivationReport};
use crate::ingest::{ingest_all, IngestReport};
use crate::io::http::{Clock, HttpClient, ReqwestClient, SystemClock};
use crate::io::{export_all, render_summary};
use crate::observability::{set_phase, RunPhase};
use crate::sources::github::GithubClient;
use crate::sources::sentry::SentryClient;
use crate::sources::IncidentSource;
use crate::sources::SignalSource;
use crate::store::{DoraStore, IngestRun};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the effective configuration: file, then environment, then flags.
pub fn resolve_config<F>(
    explicit: Option<&Path>,
    lookup: F,
    db: Option<PathBuf>,
    output: Option<PathBuf>,
) -> crate::errors::Result<DoraConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let _phase = set_phase(RunPhase::Configuration);
    let mut config = apply_env_overrides(load_config(explicit)?, lookup)?;
    if let Some(db) = db {
        config.storage.db_path = db;
    }
    if let Some(output) = output {
        config.storage.export_path = output;
    }
    Ok(config)
}

/// Network collaborators and the current time for one run.
#[derive(Clone)]
pub struct Services {
    pub http: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
    pub now: DateTime<Utc>,
}

impl Services {
    pub fn system() -> crate::errors::Result<Self> {
        Ok(Self {
            http: Arc::new(ReqwestClient::new(HTTP_TIMEOUT)?),
            clock: Arc::new(SystemClock),
            now: Utc::now(),
        })
    }
}

/// What a run did, for the final log line.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ingest: Option<IngestReport>,
    pub derivation: DerivationReport,
    pub exported_rows: usize,
}

struct Clients {
    github: GithubClient,
    sentry: Option<SentryClient>,
}

fn clients(config: &DoraConfig, services: &Services) -> crate::errors::Result<Clients> {
    let target = config.github_target()?;
    let github = GithubClient::new(
        services.http.clone(),
        services.clock.clone(),
        config.retry.clone(),
        target,
    )
    .with_limits(
        config.tunables.page_cap,
        config.tunables.deploy_limit,
        config.tunables.pr_limit,
    );
    let since = config.tunables.lookback_start(services.now)?;
    let sentry = SentryClient::from_config(
        services.http.clone(),
        services.clock.clone(),
        config.retry.clone(),
        &config.sentry,
        since,
    );
    if sentry.is_none() {
        tracing::info!("Sentry credentials incomplete; incident ingestion and signal tiers disabled");
    }
    Ok(Clients { github, sentry })
}

fn open_store(config: &DoraConfig) -> Result<DoraStore> {
    let path = &config.storage.db_path;
    DoraStore::open(path).with_context(|| format!("opening store {}", path.display()))
}

fn derive_and_export(
    store: &mut DoraStore,
    config: &DoraConfig,
    clients: &Clients,
) -> Result<(DerivationReport, usize)> {
    let environment = config.environment()?;
    let ctx = DerivationContext {
        environment,
        cfr_window: config.tunables.cfr_window(),
        oracle: &clients.github,
        signals: clients.sentry.as_ref().map(|s| s as &dyn SignalSource),
        release_environment: &config.sentry.environment,
    };
    let report = run_derivation(store, &ctx).context("derivation failed")?;

    let _phase = set_phase(RunPhase::Export);
    let path = &config.storage.export_path;
    let rows = export_all(store, path).with_context(|| format!("exporting to {}", path.display()))?;
    Ok((report, rows))
}

/// Ingest, derive and export in one pass.
pub fn run_full(config: &DoraConfig, services: &Services) -> Result<RunSummary> {
    let clients = clients(config, services)?;
    let mut store = open_store(config)?;

    let run = IngestRun::starting_at(services.now);
    let ingest = ingest_all(
        &mut store,
        &clients.github,
        clients.sentry.as_ref().map(|s| s as &dyn IncidentSource),
        &run,
    )?;

    let (derivation, exported_rows) = derive_and_export(&mut store, config, &clients)?;
    Ok(RunSummary {
        ingest: Some(ingest),
        derivation,
        exported_rows,
    })
}

/// Derive and export from stored facts without ingesting.
pub fn derive_only(config: &DoraConfig, services: &Services) -> Result<RunSummary> {
    let clients = clients(config, services)?;
    let mut store = open_store(config)?;
    let (derivation, exported_rows) = derive_and_export(&mut store, config, &clients)?;
    Ok(RunSummary {
        ingest: None,
        derivation,
        exported_rows,
    })
}

pub fn export_only(config: &DoraConfig) -> Result<usize> {
    let store = open_store(config)?;
    let _phase = set_phase(RunPhase::Export);
    let path = &config.storage.export_path;
    export_all(&store, path).with_context(|| format!("exporting to {}", path.display()))
}

/// Render the stored daily summary.
pub fn print_summary(config: &DoraConfig) -> Result<String> {
    let store = open_store(config)?;
    let rows = store.load_summaries()?;
    if rows.is_empty() {
        return Ok("No daily summary rows; run `dora-metrics run` first.".to_string());
    }
    Ok(render_summary(&rows))
}
