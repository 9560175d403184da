//! Configuration for dora-metrics.
//!
//! Configuration is layered: `.dora.toml` (explicit or discovered), then
//! environment variables, then CLI flags. The result is a single
//! [`DoraConfig`] value that the binary builds once and hands to each stage.

mod core;
mod loader;
pub mod retry;

pub use core::{
    DoraConfig, GithubConfig, GithubTarget, SentryConfig, StorageConfig, TunablesConfig,
};
pub use loader::{
    apply_env_overrides, directory_ancestors, discover_config, load_config,
    load_config_from_path, parse_config, CONFIG_FILE_NAME, CONFIG_TEMPLATE,
};
pub use retry::{RetryConfig, RetryStrategy};
