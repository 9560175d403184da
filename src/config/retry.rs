//! Retry configuration for HTTP ingestion.
//!
//! Every request to GitHub or Sentry runs under a bounded retry policy:
//!
//! - 429/502/503/504 responses are retried with a growing delay
//! - a GitHub 403 with an exhausted rate limit waits until the reset time,
//!   but never longer than `max_rate_limit_wait_secs`
//! - once `max_retries` is spent the caller receives a retryable error
//!
//! # Configuration Example
//!
//! ```toml
//! [retry]
//! max_retries = 6
//! base_delay_ms = 1500
//! strategy = "exponential"
//! multiplier = 1.8
//! max_delay_ms = 60000
//! max_rate_limit_wait_secs = 900
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 6)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds (default: 1500)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Retry strategy (default: exponential)
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Growth factor for the exponential strategy (default: 1.8)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Ceiling on any single backoff delay in milliseconds (default: 60000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Longest rate-limit reset the client is willing to sleep through
    /// (default: 900 seconds)
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            strategy: RetryStrategy::default(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
        }
    }
}

impl RetryConfig {
    /// A policy that never sleeps and never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            max_rate_limit_wait_secs: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-indexed), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay_ms as f64;
        let attempt = attempt.max(1);

        let delay_ms = match self.strategy {
            RetryStrategy::Constant => base_ms,
            RetryStrategy::Linear => base_ms * (attempt as f64),
            RetryStrategy::Exponential => base_ms * self.multiplier.powi(attempt as i32 - 1),
        };

        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// True while retry number `attempt` (1-indexed) is within budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// How long to sleep for a rate limit that resets at `reset_epoch`.
    ///
    /// One extra second is added past the reset. Returns `None` when the wait
    /// exceeds `max_rate_limit_wait_secs`.
    pub fn rate_limit_wait(&self, reset_epoch: i64, now_epoch: i64) -> Option<Duration> {
        let wait = (reset_epoch - now_epoch).max(0) as u64 + 1;
        if wait > self.max_rate_limit_wait_secs {
            None
        } else {
            Some(Duration::from_secs(wait))
        }
    }
}

/// Retry delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Same delay between each retry.
    Constant,
    /// Delay increases linearly: base * attempt.
    Linear,
    /// Delay grows geometrically: base * multiplier^(attempt-1).
    Exponential,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

// Default value functions for serde
fn default_max_retries() -> u32 {
    6
}

fn default_base_delay_ms() -> u64 {
    1500
}

fn default_multiplier() -> f64 {
    1.8
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_rate_limit_wait_secs() -> u64 {
    900
}
