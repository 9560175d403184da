use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dora-metrics")]
#[command(about = "DORA metrics from GitHub deployments and Sentry incidents", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to .dora.toml in this or a parent directory)
    #[arg(long, global = true, env = "DORA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity level (can be repeated: -v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Store and export locations shared by the data commands.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// SQLite store path (overrides DORA_DB_PATH and the config file)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// JSON export path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest from GitHub and Sentry, derive metrics, and export JSON
    Run {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Re-derive metrics from the facts already in the store, then export
    Derive {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Export every table of the store as JSON
    Export {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the daily summary table
    Summary {
        /// SQLite store path
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Write a .dora.toml template in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_with_paths() {
        let cli = Cli::try_parse_from([
            "dora-metrics",
            "-vv",
            "run",
            "--db",
            "x.sqlite",
            "--output",
            "out.json",
        ])
        .unwrap();
        assert_eq!(cli.verbosity, 2);
        match cli.command {
            Commands::Run { store } => {
                assert_eq!(store.db, Some(PathBuf::from("x.sqlite")));
                assert_eq!(store.output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_init_force_flag() {
        let cli = Cli::try_parse_from(["dora-metrics", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
