//! Subcommand implementations called by the binary.

pub mod init;
pub mod run;

pub use init::init_config;
pub use run::{
    derive_only, export_only, print_summary, resolve_config, run_full, RunSummary, Services,
};
