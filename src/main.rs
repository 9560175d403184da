use anyhow::Result;
use clap::Parser;
use dora_metrics::cli::{Cli, Commands};
use dora_metrics::commands::{self, Services};
use dora_metrics::errors::DoraError;
use dora_metrics::observability::{init_logging, install_panic_hook};
use std::process::ExitCode;

fn main() -> ExitCode {
    install_panic_hook();
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<DoraError>()
                .map_or(1, DoraError::exit_code);
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::from(code as u8)
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init_config(&std::env::current_dir()?, force),
        Commands::Run { store } => {
            let config = commands::resolve_config(config_path, env_lookup, store.db, store.output)?;
            let summary = commands::run_full(&config, &Services::system()?)?;
            tracing::info!(
                windows = summary.derivation.windows,
                lead_times = summary.derivation.lead_times,
                failed = summary.derivation.failed_deployments,
                days = summary.derivation.summary_days,
                rows = summary.exported_rows,
                "Run complete"
            );
            Ok(())
        }
        Commands::Derive { store } => {
            let config = commands::resolve_config(config_path, env_lookup, store.db, store.output)?;
            let summary = commands::derive_only(&config, &Services::system()?)?;
            tracing::info!(days = summary.derivation.summary_days, "Derivation complete");
            Ok(())
        }
        Commands::Export { store } => {
            let config = commands::resolve_config(config_path, env_lookup, store.db, store.output)?;
            commands::export_only(&config)?;
            Ok(())
        }
        Commands::Summary { db } => {
            let config = commands::resolve_config(config_path, env_lookup, db, None)?;
            println!("{}", commands::print_summary(&config)?);
            Ok(())
        }
    }
}
